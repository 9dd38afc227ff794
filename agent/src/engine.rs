use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

use envelo_core::{
    Boundary, BoundaryCatalog, BoundaryError, BoundaryEvaluation, CheckOutcome, EvaluationRecord,
    EvaluationResult, Parameters, StatsSnapshot, Violation,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::BoundaryViolation;
use crate::journal::TelemetryJournal;
use crate::session::SessionStats;

/// Pseudo-boundary named in the refusal returned once enforcement is halted.
pub const HALTED_BOUNDARY: &str = "agent_session";

/// Outcome of a guarded action. Callers branch on it instead of relying on
/// an error for control flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed,
    Blocked(Vec<Violation>),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Everything one `enforce_params` call decided.
#[derive(Debug, Clone, Serialize)]
pub struct Enforcement {
    pub action_id: Uuid,
    pub result: EvaluationResult,
    pub violations: Vec<Violation>,
    pub evaluations: Vec<BoundaryEvaluation>,
}

impl Enforcement {
    pub fn ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn into_decision(self) -> Decision {
        if self.violations.is_empty() {
            Decision::Allowed
        } else {
            Decision::Blocked(self.violations)
        }
    }
}

/// Synchronous boundary evaluator.
///
/// Checks are pure in-memory comparisons. Recording the outcome touches
/// only the atomic stats counters and the journal lock; nothing here
/// performs I/O.
///
/// Once halted (the session has stopped) every action is refused and
/// nothing more is recorded.
#[derive(Debug, Default)]
pub struct EnforcementEngine {
    catalog: RwLock<BoundaryCatalog>,
    journal: TelemetryJournal,
    stats: SessionStats,
    halted: AtomicBool,
}

impl EnforcementEngine {
    pub fn new(catalog: BoundaryCatalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            journal: TelemetryJournal::new(),
            stats: SessionStats::default(),
            halted: AtomicBool::new(false),
        }
    }

    /// Refuse every action from now on. Irreversible.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    fn catalog(&self) -> RwLockReadGuard<'_, BoundaryCatalog> {
        self.catalog.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Evaluate one parameter without recording anything.
    pub fn check(&self, name: &str, value: f64) -> CheckOutcome {
        self.catalog().check(name, value)
    }

    /// Evaluate every parameter, record the outcome, and return it.
    ///
    /// Never short-circuits: all violations are collected. Always bumps
    /// exactly one counter and appends exactly one record, including when
    /// the call blocks. A halted engine blocks without recording.
    pub fn enforce_params(&self, action_type: &str, params: &Parameters) -> Enforcement {
        if self.is_halted() {
            tracing::warn!(action_type, "action refused; enforcement halted");
            return Enforcement {
                action_id: Uuid::now_v7(),
                result: EvaluationResult::Block,
                violations: vec![Violation {
                    boundary: HALTED_BOUNDARY.to_string(),
                    value: 0.0,
                    message: "agent stopped; enforcement halted".to_string(),
                }],
                evaluations: Vec::new(),
            };
        }

        let (evaluations, violations) = {
            let catalog = self.catalog();
            let mut evaluations = Vec::with_capacity(params.len());
            let mut violations = Vec::new();
            for (name, &value) in params {
                let outcome = catalog.check(name, value);
                if !outcome.passed {
                    violations.push(Violation {
                        boundary: name.clone(),
                        value,
                        message: outcome.message.clone().unwrap_or_default(),
                    });
                }
                evaluations.push(BoundaryEvaluation {
                    boundary: name.clone(),
                    value,
                    passed: outcome.passed,
                    message: outcome.message,
                });
            }
            (evaluations, violations)
        };

        let result = if violations.is_empty() {
            EvaluationResult::Pass
        } else {
            EvaluationResult::Block
        };
        self.stats.record(result);

        let record =
            EvaluationRecord::new(action_type, result, params.clone(), evaluations.clone());
        let action_id = record.action_id;
        self.journal.append(record);

        if result == EvaluationResult::Block {
            tracing::warn!(
                action_id = %action_id,
                action_type,
                violations = violations.len(),
                first = %violations[0].message,
                "action blocked"
            );
        } else {
            tracing::debug!(action_id = %action_id, action_type, "action passed");
        }

        Enforcement {
            action_id,
            result,
            violations,
            evaluations,
        }
    }

    pub fn guard(&self, action_type: &str, params: &Parameters) -> Decision {
        self.enforce_params(action_type, params).into_decision()
    }

    /// Run `action` only if every parameter is within its boundary.
    ///
    /// Fail-closed: on any violation the action is not executed and the
    /// error names the first violation.
    pub fn enforce<T>(
        &self,
        action_type: &str,
        params: &Parameters,
        action: impl FnOnce() -> T,
    ) -> Result<T, BoundaryViolation> {
        match self.guard(action_type, params) {
            Decision::Allowed => Ok(action()),
            Decision::Blocked(violations) => Err(BoundaryViolation {
                action_type: action_type.to_string(),
                violations,
            }),
        }
    }

    /// Swap in a freshly synced catalog. On error the current one stays.
    pub fn replace_boundaries(&self, boundaries: Vec<Boundary>) -> Result<(), BoundaryError> {
        let next = BoundaryCatalog::new(boundaries)?;
        *self.catalog.write().unwrap_or_else(|e| e.into_inner()) = next;
        Ok(())
    }

    pub fn boundaries(&self) -> Vec<Boundary> {
        self.catalog().snapshot()
    }

    pub fn journal(&self) -> &TelemetryJournal {
        &self.journal
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn counters(&self) -> &SessionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> EnforcementEngine {
        EnforcementEngine::new(
            BoundaryCatalog::new(vec![
                Boundary::new("velocity_max", None, Some(35.0), "mph", 0.0).unwrap(),
                Boundary::new("battery_pct", Some(15.0), None, "%", 0.0).unwrap(),
                Boundary::new("wind_speed", Some(0.0), Some(25.0), "kt", 2.0).unwrap(),
            ])
            .unwrap(),
        )
    }

    fn params(pairs: &[(&str, f64)]) -> Parameters {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn over_limit_blocks_and_counts() {
        let engine = engine();
        let outcome = engine.enforce_params("drive", &params(&[("velocity_max", 40.0)]));
        assert_eq!(outcome.result, EvaluationResult::Block);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(
            outcome.violations[0].message,
            "velocity_max: 40 exceeds max 35mph"
        );
        assert_eq!(engine.stats().block_count, 1);
        assert_eq!(engine.stats().pass_count, 0);
    }

    #[test]
    fn at_limit_passes_with_zero_tolerance() {
        let engine = engine();
        let outcome = engine.enforce_params("drive", &params(&[("velocity_max", 35.0)]));
        assert_eq!(outcome.result, EvaluationResult::Pass);
        assert!(outcome.ok());
        assert_eq!(engine.stats().pass_count, 1);
    }

    #[test]
    fn all_violations_collected_and_every_parameter_evaluated() {
        let engine = engine();
        let outcome = engine.enforce_params(
            "drive",
            &params(&[
                ("velocity_max", 50.0),
                ("battery_pct", 3.0),
                ("wind_speed", 26.5),
                ("cabin_temp", 99.0),
            ]),
        );
        assert_eq!(outcome.violations.len(), 2);
        assert_eq!(outcome.evaluations.len(), 4);
        assert_eq!(
            outcome.evaluations.iter().filter(|e| e.passed).count(),
            2
        );
    }

    #[test]
    fn every_call_appends_exactly_one_record() {
        let engine = engine();
        engine.enforce_params("drive", &params(&[("velocity_max", 10.0)]));
        engine.enforce_params("drive", &params(&[("velocity_max", 99.0)]));
        engine.enforce_params("drive", &params(&[]));
        let records = engine.journal().drain();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].result, EvaluationResult::Block);
        assert_eq!(engine.stats().total(), 3);
    }

    #[test]
    fn record_carries_full_evaluation_list_on_block() {
        let engine = engine();
        let outcome = engine.enforce_params(
            "lift",
            &params(&[("battery_pct", 80.0), ("velocity_max", 36.0)]),
        );
        let record = engine.journal().drain().remove(0);
        assert_eq!(record.action_id, outcome.action_id);
        assert_eq!(record.action_type, "lift");
        assert_eq!(record.boundary_evaluations.len(), 2);
        assert_eq!(record.parameters.len(), 2);
    }

    #[test]
    fn enforce_does_not_run_blocked_action() {
        let engine = engine();
        let mut ran = false;
        let err = engine
            .enforce("drive", &params(&[("velocity_max", 40.0)]), || ran = true)
            .expect_err("should block");
        assert!(!ran);
        assert_eq!(
            err.to_string(),
            "action 'drive' blocked: velocity_max: 40 exceeds max 35mph"
        );
        assert_eq!(err.first().map(|v| v.boundary.as_str()), Some("velocity_max"));
    }

    #[test]
    fn enforce_runs_allowed_action() {
        let engine = engine();
        let value = engine
            .enforce("drive", &params(&[("velocity_max", 20.0)]), || 7)
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn guard_reports_blocked_reasons() {
        let engine = engine();
        match engine.guard("drive", &params(&[("battery_pct", 5.0)])) {
            Decision::Blocked(reasons) => {
                assert_eq!(reasons[0].message, "battery_pct: 5 below min 15%")
            }
            Decision::Allowed => panic!("expected block"),
        }
        assert!(engine.guard("drive", &params(&[("battery_pct", 15.0)])).is_allowed());
    }

    #[test]
    fn halted_engine_refuses_and_records_nothing() {
        let engine = engine();
        engine.halt();
        let mut ran = false;
        let err = engine
            .enforce("drive", &params(&[("velocity_max", 10.0)]), || ran = true)
            .expect_err("halted engine must refuse");
        assert!(!ran);
        assert_eq!(err.first().map(|v| v.boundary.as_str()), Some(HALTED_BOUNDARY));
        assert!(!engine.guard("drive", &params(&[])).is_allowed());
        assert!(engine.journal().is_empty());
        assert_eq!(engine.stats().total(), 0);
    }

    #[test]
    fn replace_boundaries_keeps_current_catalog_on_error() {
        let engine = engine();
        let bad = vec![Boundary {
            name: "x".to_string(),
            min: None,
            max: None,
            unit: String::new(),
            tolerance: 0.0,
        }];
        assert!(engine.replace_boundaries(bad).is_err());
        assert_eq!(engine.boundaries().len(), 3);
        assert!(!engine.check("velocity_max", 36.0).passed);
    }
}
