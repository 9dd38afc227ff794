use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::boundary::Boundary;

/// Parameter values for one action, keyed by parameter name.
pub type Parameters = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationResult {
    Pass,
    Block,
}

impl EvaluationResult {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Block => "BLOCK",
        }
    }
}

/// Outcome for one parameter inside an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryEvaluation {
    pub boundary: String,
    pub value: f64,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A parameter that fell outside its boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub boundary: String,
    pub value: f64,
    pub message: String,
}

/// One enforcement call, as reported to the registry.
///
/// Records are immutable. The journal fills in the chain fields
/// (`sequence`, `prev_hash`, `record_hash`) exactly once, when appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub timestamp: DateTime<Utc>,
    /// UUIDv7, unique per evaluation
    pub action_id: Uuid,
    pub action_type: String,
    pub result: EvaluationResult,
    pub parameters: Parameters,
    pub boundary_evaluations: Vec<BoundaryEvaluation>,
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub prev_hash: String,
    #[serde(default)]
    pub record_hash: String,
}

impl EvaluationRecord {
    pub fn new(
        action_type: impl Into<String>,
        result: EvaluationResult,
        parameters: Parameters,
        boundary_evaluations: Vec<BoundaryEvaluation>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action_id: Uuid::now_v7(),
            action_type: action_type.into(),
            result,
            parameters,
            boundary_evaluations,
            sequence: 0,
            prev_hash: String::new(),
            record_hash: String::new(),
        }
    }
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub pass_count: u64,
    pub block_count: u64,
}

impl StatsSnapshot {
    pub fn total(&self) -> u64 {
        self.pass_count + self.block_count
    }
}

// Registry wire payloads

#[derive(Debug, Serialize)]
pub struct SessionRegistration<'a> {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub certificate_id: &'a str,
    pub agent_version: &'a str,
    pub boundaries: Vec<Boundary>,
}

#[derive(Debug, Serialize)]
pub struct Heartbeat<'a> {
    pub session_id: Uuid,
    pub certificate_id: &'a str,
    pub timestamp: DateTime<Utc>,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct TelemetryBatch<'a> {
    pub certificate_id: &'a str,
    pub session_id: Uuid,
    pub records: &'a [EvaluationRecord],
    pub stats: StatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct SessionEnd {
    pub session_id: Uuid,
    pub ended_at: DateTime<Utc>,
    pub stats: StatsSnapshot,
}
