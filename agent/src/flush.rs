use std::time::Duration;

use envelo_core::telemetry::TelemetryBatch;
use uuid::Uuid;

use crate::journal::TelemetryJournal;
use crate::registry::{Registry, RegistryError, bounded};
use crate::session::SessionStats;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Journal was empty; nothing sent.
    Idle,
    Delivered { records: usize },
    /// Delivery failed; the batch is back at the front of the journal.
    Requeued { records: usize, error: RegistryError },
    /// 401. The batch is requeued and the agent must shut down.
    Revoked { records: usize },
}

/// Identity stamped on every outbound batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchContext<'a> {
    pub certificate_id: &'a str,
    pub session_id: Uuid,
}

/// Drain the journal and deliver it as one batch.
///
/// The batch is either fully acknowledged or fully requeued; no lock is held
/// while the request is in flight. Counters are read after the drain so the
/// batch never carries more records than its stats account for.
pub async fn flush_once<R: Registry>(
    registry: &R,
    journal: &TelemetryJournal,
    context: BatchContext<'_>,
    stats: &SessionStats,
    timeout: Duration,
) -> FlushOutcome {
    let batch = journal.drain();
    if batch.is_empty() {
        return FlushOutcome::Idle;
    }
    let records = batch.len();
    let stats = stats.snapshot();

    let payload = TelemetryBatch {
        certificate_id: context.certificate_id,
        session_id: context.session_id,
        records: &batch,
        stats,
    };
    let result = bounded(timeout, registry.deliver_telemetry(&payload)).await;

    match result {
        Ok(()) => FlushOutcome::Delivered { records },
        Err(error) => {
            journal.requeue(batch);
            if error.is_unauthorized() {
                FlushOutcome::Revoked { records }
            } else {
                FlushOutcome::Requeued { records, error }
            }
        }
    }
}
