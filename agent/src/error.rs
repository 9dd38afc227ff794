use std::path::PathBuf;

use envelo_core::{BoundaryError, Violation};
use thiserror::Error;

use crate::registry::RegistryError;
use crate::session::SessionState;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read boundaries file {path}: {source}")]
    BoundariesFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("agent cannot start from state {0}")]
    InvalidState(SessionState),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Hard failure returned to a guarded action that was not executed.
///
/// Names the first violation; the full list is kept for callers that
/// want every reason.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("action '{action_type}' blocked: {}", .violations.first().map(|v| v.message.as_str()).unwrap_or("boundary violation"))]
pub struct BoundaryViolation {
    pub action_type: String,
    pub violations: Vec<Violation>,
}

impl BoundaryViolation {
    pub fn first(&self) -> Option<&Violation> {
        self.violations.first()
    }
}
