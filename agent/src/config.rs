use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use envelo_core::{Boundary, parse_boundary_payload};

use crate::error::AgentError;

pub const DEFAULT_HEARTBEAT_SECS: u64 = 60;
pub const DEFAULT_FLUSH_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

/// Connection and scheduling settings for the agent daemon.
#[derive(Debug, Clone, Args)]
pub struct AgentArgs {
    /// Certification Registry base URL
    #[arg(long, env = "ENVELO_API_URL", default_value = "http://localhost:3000")]
    pub api_url: String,

    /// Bearer credential scoped to the certificate
    #[arg(long, env = "ENVELO_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Certificate whose boundaries this agent enforces
    #[arg(long, env = "ENVELO_CERTIFICATE_ID")]
    pub certificate_id: String,

    /// Seconds between heartbeats
    #[arg(long, env = "ENVELO_HEARTBEAT_SECS", default_value_t = DEFAULT_HEARTBEAT_SECS)]
    pub heartbeat_secs: u64,

    /// Seconds between telemetry flushes (must be shorter than the heartbeat)
    #[arg(long, env = "ENVELO_FLUSH_SECS", default_value_t = DEFAULT_FLUSH_SECS)]
    pub flush_secs: u64,

    /// Per-request timeout for registry calls, in seconds
    #[arg(long, env = "ENVELO_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Consecutive heartbeat failures before the agent shuts down
    #[arg(long, env = "ENVELO_FAILURE_THRESHOLD", default_value_t = DEFAULT_FAILURE_THRESHOLD)]
    pub failure_threshold: u32,

    /// JSON file with local default boundaries, used when the registry sync fails
    #[arg(long, env = "ENVELO_BOUNDARIES_FILE")]
    pub boundaries_file: Option<PathBuf>,

    /// Loopback address for the local enforcement API
    #[arg(long, env = "ENVELO_LISTEN_ADDR", default_value = "127.0.0.1:7474")]
    pub listen_addr: SocketAddr,

    /// Register a systemd user unit so the agent restarts on boot
    #[arg(long, env = "ENVELO_AUTOSTART")]
    pub autostart: bool,
}

impl AgentArgs {
    pub fn validate(&self) -> Result<(), AgentError> {
        url::Url::parse(&self.api_url)
            .map_err(|e| AgentError::Config(format!("invalid api_url '{}': {e}", self.api_url)))?;
        if self.api_key.trim().is_empty() {
            return Err(AgentError::Config("api_key must not be empty".to_string()));
        }
        if self.certificate_id.trim().is_empty() {
            return Err(AgentError::Config(
                "certificate_id must not be empty".to_string(),
            ));
        }
        if self.heartbeat_secs == 0 || self.flush_secs == 0 || self.request_timeout_secs == 0 {
            return Err(AgentError::Config(
                "heartbeat, flush, and request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.flush_secs >= self.heartbeat_secs {
            return Err(AgentError::Config(format!(
                "flush interval ({}s) must be shorter than heartbeat interval ({}s)",
                self.flush_secs, self.heartbeat_secs
            )));
        }
        if self.failure_threshold == 0 {
            return Err(AgentError::Config(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            certificate_id: self.certificate_id.trim().to_string(),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            flush_interval: Duration::from_secs(self.flush_secs),
            request_timeout: self.request_timeout(),
            failure_threshold: self.failure_threshold,
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Local defaults from `boundaries_file`, or none.
    pub fn load_default_boundaries(&self) -> Result<Vec<Boundary>, AgentError> {
        match &self.boundaries_file {
            Some(path) => load_boundaries_file(path),
            None => Ok(Vec::new()),
        }
    }
}

/// Read `{"boundaries": [...]}` or a bare array from disk.
pub fn load_boundaries_file(path: &std::path::Path) -> Result<Vec<Boundary>, AgentError> {
    let raw = std::fs::read_to_string(path).map_err(|source| AgentError::BoundariesFile {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
        AgentError::Config(format!("invalid JSON in '{}': {e}", path.display()))
    })?;
    Ok(parse_boundary_payload(&value)?)
}

/// What the runtime itself needs, independent of how it was configured.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub certificate_id: String,
    pub heartbeat_interval: Duration,
    pub flush_interval: Duration,
    pub request_timeout: Duration,
    pub failure_threshold: u32,
    pub agent_version: String,
}

impl RuntimeSettings {
    pub fn new(certificate_id: impl Into<String>) -> Self {
        Self {
            certificate_id: certificate_id.into(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
