use serde::{Deserialize, Serialize};

/// Structured error body, shared by the registry and the agent's local API.
/// Every error carries enough information for the caller to act on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "agent_stopped")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Request ID for tracing and debugging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Hint about what the correct usage looks like
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the agent and its registry contract
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const AGENT_STOPPED: &str = "agent_stopped";
}
