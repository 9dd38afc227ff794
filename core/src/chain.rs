//! Hash chaining for evaluation records.
//!
//! Every record carries the hash of its predecessor, so the registry (or the
//! audit viewer) can detect dropped, reordered, or edited records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::telemetry::{BoundaryEvaluation, EvaluationRecord, EvaluationResult, Parameters};

/// `prev_hash` of the first record in a session.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Serialize)]
struct ChainView<'a> {
    sequence: u64,
    timestamp: &'a DateTime<Utc>,
    action_id: &'a Uuid,
    action_type: &'a str,
    result: EvaluationResult,
    parameters: &'a Parameters,
    boundary_evaluations: &'a [BoundaryEvaluation],
}

/// SHA-256 hex digest of `prev_hash` followed by the record's canonical JSON.
pub fn record_digest(prev_hash: &str, record: &EvaluationRecord) -> String {
    let view = ChainView {
        sequence: record.sequence,
        timestamp: &record.timestamp,
        action_id: &record.action_id,
        action_type: &record.action_type,
        result: record.result,
        parameters: &record.parameters,
        boundary_evaluations: &record.boundary_evaluations,
    };
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    // Plain structs with string keys: serialization cannot fail.
    let _ = serde_json::to_writer(&mut hasher, &view);
    hex::encode(hasher.finalize())
}

/// Fill in the chain fields of `record` as the successor of `prev_hash`.
pub fn seal(record: &mut EvaluationRecord, sequence: u64, prev_hash: &str) {
    record.sequence = sequence;
    record.prev_hash = prev_hash.to_string();
    record.record_hash = record_digest(prev_hash, record);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("record {index} has sequence {found}, expected {expected}")]
    SequenceGap {
        index: usize,
        expected: u64,
        found: u64,
    },
    #[error("record {index} does not link to its predecessor")]
    BrokenLink { index: usize },
    #[error("record {index} hash does not match its contents")]
    HashMismatch { index: usize },
}

/// Verify a contiguous run of sealed records.
///
/// The first record's `prev_hash` is trusted as the anchor, so a delivered
/// batch can be verified on its own.
pub fn verify_chain(records: &[EvaluationRecord]) -> Result<(), ChainError> {
    let mut previous: Option<&EvaluationRecord> = None;
    for (index, record) in records.iter().enumerate() {
        if let Some(prev) = previous {
            let expected = prev.sequence + 1;
            if record.sequence != expected {
                return Err(ChainError::SequenceGap {
                    index,
                    expected,
                    found: record.sequence,
                });
            }
            if record.prev_hash != prev.record_hash {
                return Err(ChainError::BrokenLink { index });
            }
        }
        if record_digest(&record.prev_hash, record) != record.record_hash {
            return Err(ChainError::HashMismatch { index });
        }
        previous = Some(record);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed_run(n: usize) -> Vec<EvaluationRecord> {
        let mut prev = GENESIS_HASH.to_string();
        (0..n)
            .map(|i| {
                let mut params = Parameters::new();
                params.insert("velocity_max".to_string(), i as f64);
                let mut record =
                    EvaluationRecord::new("drive", EvaluationResult::Pass, params, vec![]);
                seal(&mut record, i as u64 + 1, &prev);
                prev = record.record_hash.clone();
                record
            })
            .collect()
    }

    #[test]
    fn sealed_run_verifies() {
        let records = sealed_run(4);
        assert_eq!(records[0].prev_hash, GENESIS_HASH);
        assert_eq!(records[0].record_hash.len(), 64);
        assert_eq!(verify_chain(&records), Ok(()));
    }

    #[test]
    fn edited_record_is_detected() {
        let mut records = sealed_run(3);
        records[1].result = EvaluationResult::Block;
        assert_eq!(
            verify_chain(&records),
            Err(ChainError::HashMismatch { index: 1 })
        );
    }

    #[test]
    fn dropped_record_is_detected() {
        let mut records = sealed_run(3);
        records.remove(1);
        assert_eq!(
            verify_chain(&records),
            Err(ChainError::SequenceGap {
                index: 1,
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn digest_depends_on_predecessor() {
        let records = sealed_run(1);
        let other = record_digest("ff", &records[0]);
        assert_ne!(other, records[0].record_hash);
    }
}
