//! Scripted in-memory registry for runtime tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use envelo_core::telemetry::{Heartbeat, SessionEnd, SessionRegistration, TelemetryBatch};
use envelo_core::{Boundary, EvaluationRecord, StatsSnapshot};
use uuid::Uuid;

use crate::registry::{Registry, RegistryError};

#[derive(Debug, Clone)]
enum Step {
    Reply(Result<(), RegistryError>),
    Delayed(Duration, Result<(), RegistryError>),
    Hang,
}

impl Step {
    async fn play(self) -> Result<(), RegistryError> {
        match self {
            Step::Reply(result) => result,
            Step::Delayed(delay, result) => {
                tokio::time::sleep(delay).await;
                result
            }
            Step::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug)]
struct Script {
    queued: VecDeque<Step>,
    fallback: Step,
}

impl Script {
    fn ok() -> Self {
        Self {
            queued: VecDeque::new(),
            fallback: Step::Reply(Ok(())),
        }
    }

    fn next(&mut self) -> Step {
        self.queued
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub(crate) struct ScriptedRegistry {
    boundaries: Mutex<Result<Vec<Boundary>, RegistryError>>,
    boundaries_delay: Duration,
    register: Mutex<Script>,
    heartbeat: Mutex<Script>,
    flush: Mutex<Script>,
    end: Mutex<Script>,
    delivered: Mutex<Vec<EvaluationRecord>>,
    registered_sessions: Mutex<Vec<Uuid>>,
    ended: Mutex<Vec<StatsSnapshot>>,
    batch_stats: Mutex<Vec<StatsSnapshot>>,
    calls: Mutex<Vec<&'static str>>,
    heartbeat_calls: AtomicUsize,
    flush_calls: AtomicUsize,
}

impl ScriptedRegistry {
    pub(crate) fn new() -> Self {
        Self {
            boundaries: Mutex::new(Err(RegistryError::Transport(
                "no boundaries scripted".to_string(),
            ))),
            boundaries_delay: Duration::ZERO,
            register: Mutex::new(Script::ok()),
            heartbeat: Mutex::new(Script::ok()),
            flush: Mutex::new(Script::ok()),
            end: Mutex::new(Script::ok()),
            delivered: Mutex::new(Vec::new()),
            registered_sessions: Mutex::new(Vec::new()),
            ended: Mutex::new(Vec::new()),
            batch_stats: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            heartbeat_calls: AtomicUsize::new(0),
            flush_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_boundaries(self, boundaries: Result<Vec<Boundary>, RegistryError>) -> Self {
        *self.boundaries.lock().unwrap() = boundaries;
        self
    }

    pub(crate) fn boundaries_after(mut self, delay: Duration) -> Self {
        self.boundaries_delay = delay;
        self
    }

    pub(crate) fn register_after(self, delay: Duration) -> Self {
        self.register.lock().unwrap().fallback = Step::Delayed(delay, Ok(()));
        self
    }

    pub(crate) fn register_fails(self, error: RegistryError) -> Self {
        self.register.lock().unwrap().fallback = Step::Reply(Err(error));
        self
    }

    pub(crate) fn push_heartbeat(self, result: Result<(), RegistryError>) -> Self {
        self.heartbeat.lock().unwrap().queued.push_back(Step::Reply(result));
        self
    }

    pub(crate) fn heartbeat_always(self, result: Result<(), RegistryError>) -> Self {
        self.heartbeat.lock().unwrap().fallback = Step::Reply(result);
        self
    }

    pub(crate) fn heartbeat_hangs(self) -> Self {
        self.heartbeat.lock().unwrap().fallback = Step::Hang;
        self
    }

    pub(crate) fn push_flush(self, result: Result<(), RegistryError>) -> Self {
        self.flush.lock().unwrap().queued.push_back(Step::Reply(result));
        self
    }

    pub(crate) fn flush_always(self, result: Result<(), RegistryError>) -> Self {
        self.flush.lock().unwrap().fallback = Step::Reply(result);
        self
    }

    pub(crate) fn flush_hangs(self) -> Self {
        self.flush.lock().unwrap().fallback = Step::Hang;
        self
    }

    pub(crate) fn end_fails(self, error: RegistryError) -> Self {
        self.end.lock().unwrap().fallback = Step::Reply(Err(error));
        self
    }

    pub(crate) fn delivered(&self) -> Vec<EvaluationRecord> {
        self.delivered.lock().unwrap().clone()
    }

    pub(crate) fn registered_sessions(&self) -> Vec<Uuid> {
        self.registered_sessions.lock().unwrap().clone()
    }

    pub(crate) fn ended(&self) -> Vec<StatsSnapshot> {
        self.ended.lock().unwrap().clone()
    }

    /// `stats` carried by each delivered batch.
    pub(crate) fn batch_stats(&self) -> Vec<StatsSnapshot> {
        self.batch_stats.lock().unwrap().clone()
    }

    /// Completed calls, in completion order.
    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub(crate) fn heartbeat_calls(&self) -> usize {
        self.heartbeat_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }
}

impl Registry for ScriptedRegistry {
    async fn fetch_boundaries(&self, _certificate_id: &str) -> Result<Vec<Boundary>, RegistryError> {
        if !self.boundaries_delay.is_zero() {
            tokio::time::sleep(self.boundaries_delay).await;
        }
        self.log("boundaries");
        self.boundaries.lock().unwrap().clone()
    }

    async fn register_session(
        &self,
        registration: &SessionRegistration<'_>,
    ) -> Result<(), RegistryError> {
        let step = self.register.lock().unwrap().next();
        let result = step.play().await;
        self.log("register");
        if result.is_ok() {
            self.registered_sessions
                .lock()
                .unwrap()
                .push(registration.session_id);
        }
        result
    }

    async fn heartbeat(&self, _beat: &Heartbeat<'_>) -> Result<(), RegistryError> {
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.heartbeat.lock().unwrap().next();
        step.play().await
    }

    async fn deliver_telemetry(&self, batch: &TelemetryBatch<'_>) -> Result<(), RegistryError> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.flush.lock().unwrap().next();
        let result = step.play().await;
        self.log("telemetry");
        if result.is_ok() {
            self.batch_stats.lock().unwrap().push(batch.stats);
            self.delivered
                .lock()
                .unwrap()
                .extend(batch.records.iter().cloned());
        }
        result
    }

    async fn end_session(&self, end: &SessionEnd) -> Result<(), RegistryError> {
        let step = self.end.lock().unwrap().next();
        let result = step.play().await;
        self.log("end");
        if result.is_ok() {
            self.ended.lock().unwrap().push(end.stats);
        }
        result
    }
}
