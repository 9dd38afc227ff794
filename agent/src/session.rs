use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use envelo_core::{EvaluationResult, StatsSnapshot};
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle of one agent session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Unstarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SessionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unstarted => "UNSTARTED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
        }
    }

    /// STOPPING or STOPPED: no new background ticks may run.
    pub const fn is_winding_down(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the session is ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// Explicit `shutdown()` by the host.
    Requested,
    /// Host process termination signal.
    Signal,
    /// Registry answered 401: the certificate credential is revoked.
    CredentialRevoked,
    /// Heartbeat failures reached the configured threshold.
    RegistryUnreachable,
    /// A background loop panicked.
    BackgroundFailure,
}

impl ShutdownReason {
    /// A revoked identity must not present any more telemetry.
    pub const fn delivers_final_telemetry(self) -> bool {
        !matches!(self, Self::CredentialRevoked)
    }

    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::CredentialRevoked | Self::RegistryUnreachable | Self::BackgroundFailure
        )
    }
}

/// Identity of the running session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: Uuid,
    pub certificate_id: String,
    pub started_at: DateTime<Utc>,
}

/// Pass/block counters, written by the enforcement path and read by the
/// background loops. Each update is a single atomic increment.
#[derive(Debug, Default)]
pub struct SessionStats {
    pass_count: AtomicU64,
    block_count: AtomicU64,
}

impl SessionStats {
    pub fn record(&self, result: EvaluationResult) {
        let counter = match result {
            EvaluationResult::Pass => &self.pass_count,
            EvaluationResult::Block => &self.block_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pass_count: self.pass_count.load(Ordering::Relaxed),
            block_count: self.block_count.load(Ordering::Relaxed),
        }
    }
}
