use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use envelo_core::EvaluationRecord;
use envelo_core::chain::{self, GENESIS_HASH};

/// In-memory queue of evaluation records waiting for delivery.
///
/// Records are sealed into the hash chain on `append`. `drain` hands out the
/// whole queue as one batch; a failed delivery hands it back with `requeue`,
/// which restores it ahead of anything appended in the meantime. The journal
/// itself never discards a record.
#[derive(Debug)]
pub struct TelemetryJournal {
    state: Mutex<JournalState>,
}

#[derive(Debug)]
struct JournalState {
    pending: VecDeque<EvaluationRecord>,
    next_sequence: u64,
    last_hash: String,
}

impl Default for TelemetryJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryJournal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(JournalState {
                pending: VecDeque::new(),
                next_sequence: 1,
                last_hash: GENESIS_HASH.to_string(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JournalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seal and enqueue a record. Returns its chain sequence number.
    pub fn append(&self, mut record: EvaluationRecord) -> u64 {
        let mut state = self.lock();
        let sequence = state.next_sequence;
        chain::seal(&mut record, sequence, &state.last_hash);
        state.last_hash.clone_from(&record.record_hash);
        state.next_sequence += 1;
        state.pending.push_back(record);
        sequence
    }

    /// Atomically take every pending record, oldest first.
    pub fn drain(&self) -> Vec<EvaluationRecord> {
        self.lock().pending.drain(..).collect()
    }

    /// Put an undelivered batch back at the front, in its original order.
    pub fn requeue(&self, batch: Vec<EvaluationRecord>) {
        let mut state = self.lock();
        for record in batch.into_iter().rev() {
            state.pending.push_front(record);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Copy of the pending records, oldest first.
    pub fn pending(&self) -> Vec<EvaluationRecord> {
        self.lock().pending.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envelo_core::chain::verify_chain;
    use envelo_core::{EvaluationResult, Parameters};

    fn record(value: f64) -> EvaluationRecord {
        let mut params = Parameters::new();
        params.insert("velocity_max".to_string(), value);
        EvaluationRecord::new("drive", EvaluationResult::Pass, params, vec![])
    }

    fn values(records: &[EvaluationRecord]) -> Vec<f64> {
        records.iter().map(|r| r.parameters["velocity_max"]).collect()
    }

    #[test]
    fn append_seals_a_contiguous_chain() {
        let journal = TelemetryJournal::new();
        assert_eq!(journal.append(record(1.0)), 1);
        assert_eq!(journal.append(record(2.0)), 2);
        let batch = journal.drain();
        assert_eq!(batch[0].prev_hash, GENESIS_HASH);
        assert_eq!(batch[1].prev_hash, batch[0].record_hash);
        assert_eq!(verify_chain(&batch), Ok(()));
    }

    #[test]
    fn drain_empties_the_journal() {
        let journal = TelemetryJournal::new();
        journal.append(record(1.0));
        journal.append(record(2.0));
        assert_eq!(journal.drain().len(), 2);
        assert!(journal.is_empty());
        assert!(journal.drain().is_empty());
    }

    #[test]
    fn requeue_restores_batch_ahead_of_newer_records() {
        let journal = TelemetryJournal::new();
        for v in [1.0, 2.0, 3.0] {
            journal.append(record(v));
        }
        let batch = journal.drain();
        journal.append(record(4.0));
        journal.requeue(batch);

        let pending = journal.drain();
        assert_eq!(values(&pending), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(verify_chain(&pending), Ok(()));
    }

    #[test]
    fn failed_then_successful_flush_delivers_same_records_once() {
        let journal = TelemetryJournal::new();
        for v in [10.0, 20.0, 30.0] {
            journal.append(record(v));
        }
        let expected = journal.pending();

        let failed = journal.drain();
        journal.requeue(failed);
        assert_eq!(journal.len(), 3);

        let delivered = journal.drain();
        assert_eq!(delivered, expected);
        assert!(journal.is_empty());
    }
}
