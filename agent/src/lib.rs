//! ENVELO interlock agent.
//!
//! Enforces certified operating boundaries locally and keeps the
//! Certification Registry informed: the session is registered at start,
//! heartbeats prove liveness, and every evaluation is delivered as
//! telemetry. Losing the registry for long enough, or having the credential
//! revoked, stops the agent.

pub mod autostart;
pub mod config;
pub mod engine;
pub mod error;
pub mod flush;
pub mod heartbeat;
pub mod journal;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod session;

#[cfg(test)]
mod testing;

pub use engine::{Decision, Enforcement, EnforcementEngine};
pub use error::{AgentError, BoundaryViolation};
pub use registry::{HttpRegistry, Registry, RegistryError};
pub use runtime::AgentRuntime;
pub use session::{SessionState, ShutdownReason};
