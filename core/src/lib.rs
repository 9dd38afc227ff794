//! Shared model for the ENVELO interlock: boundaries, the pure boundary check,
//! evaluation records, and the registry wire payloads.

pub mod boundary;
pub mod chain;
pub mod error;
pub mod telemetry;

pub use boundary::{Boundary, BoundaryCatalog, BoundaryError, CheckOutcome, parse_boundary_payload};
pub use telemetry::{
    BoundaryEvaluation, EvaluationRecord, EvaluationResult, Parameters, StatsSnapshot, Violation,
};
