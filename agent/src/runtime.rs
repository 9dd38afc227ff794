use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use envelo_core::BoundaryCatalog;
use envelo_core::telemetry::{Heartbeat, SessionEnd, SessionRegistration};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::autostart::Autostart;
use crate::config::RuntimeSettings;
use crate::engine::EnforcementEngine;
use crate::error::AgentError;
use crate::flush::{BatchContext, FlushOutcome, flush_once};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatVerdict};
use crate::registry::{Registry, bounded};
use crate::session::{Session, SessionState, ShutdownReason};

/// Composition root of the agent.
///
/// Owns the session identity, the lifecycle state, and the heartbeat and
/// flush tasks. Cloning is cheap and every clone drives the same session.
pub struct AgentRuntime<R: Registry> {
    inner: Arc<Inner<R>>,
}

impl<R: Registry> Clone for AgentRuntime<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<R> {
    settings: RuntimeSettings,
    registry: R,
    engine: EnforcementEngine,
    autostart: Box<dyn Autostart>,
    session_id: Uuid,
    started_at: OnceLock<DateTime<Utc>>,
    stop_reason: OnceLock<ShutdownReason>,
    state: watch::Sender<SessionState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    // held by start() for its whole run; shutdown() waits on it
    lifecycle: AsyncMutex<()>,
}

impl<R: Registry> AgentRuntime<R> {
    /// `defaults` stay in force until a registry sync replaces them.
    pub fn new(
        settings: RuntimeSettings,
        registry: R,
        defaults: BoundaryCatalog,
        autostart: Box<dyn Autostart>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unstarted);
        Self {
            inner: Arc::new(Inner {
                settings,
                registry,
                engine: EnforcementEngine::new(defaults),
                autostart,
                session_id: Uuid::now_v7(),
                started_at: OnceLock::new(),
                stop_reason: OnceLock::new(),
                state,
                tasks: Mutex::new(Vec::new()),
                lifecycle: AsyncMutex::new(()),
            }),
        }
    }

    pub fn engine(&self) -> &EnforcementEngine {
        &self.inner.engine
    }

    pub fn registry(&self) -> &R {
        &self.inner.registry
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.inner.settings
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    /// `None` until `start()` has begun.
    pub fn session(&self) -> Option<Session> {
        self.inner.started_at.get().map(|started_at| Session {
            session_id: self.inner.session_id,
            certificate_id: self.inner.settings.certificate_id.clone(),
            started_at: *started_at,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn stop_reason(&self) -> Option<ShutdownReason> {
        self.inner.stop_reason.get().copied()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub async fn wait_stopped(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|state| *state == SessionState::Stopped).await;
    }

    /// Sync boundaries, register the session, and launch the background
    /// loops. Registry failures here are logged, never fatal: the agent
    /// enforces locally even if the registry never answers.
    pub async fn start(&self) -> Result<(), AgentError> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;
        let mut observed = SessionState::Unstarted;
        let began = inner.state.send_if_modified(|state| {
            observed = *state;
            if *state == SessionState::Unstarted {
                *state = SessionState::Starting;
                true
            } else {
                false
            }
        });
        if !began {
            return Err(AgentError::InvalidState(observed));
        }

        let started_at = Utc::now();
        let _ = inner.started_at.set(started_at);
        info!(
            session_id = %inner.session_id,
            certificate_id = %inner.settings.certificate_id,
            "agent starting"
        );

        self.sync_boundaries().await;
        if self.state() != SessionState::Starting {
            info!("shutdown requested during boundary sync; session not registered");
            return Ok(());
        }
        self.register_session(started_at).await;
        if let Err(err) = inner.autostart.register() {
            warn!(error = %err, "autostart registration failed");
        }

        let running = inner.state.send_if_modified(|state| {
            if *state == SessionState::Starting {
                *state = SessionState::Running;
                true
            } else {
                false
            }
        });
        if !running {
            info!("shutdown requested during startup; background loops not launched");
            return Ok(());
        }

        let heartbeat = self.spawn_loop("heartbeat", heartbeat_loop(self.clone()));
        let flush = self.spawn_loop("flush", flush_loop(self.clone()));
        inner
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend([heartbeat, flush]);

        info!(
            session_id = %inner.session_id,
            boundaries = inner.engine.boundaries().len(),
            heartbeat_secs = inner.settings.heartbeat_interval.as_secs(),
            flush_secs = inner.settings.flush_interval.as_secs(),
            "agent running"
        );
        Ok(())
    }

    /// End the session. Idempotent: only the first call does anything.
    ///
    /// Stops the loops, makes one final delivery attempt (skipped when the
    /// credential was revoked), notifies the registry, and removes the
    /// autostart registration.
    pub async fn shutdown(&self, reason: ShutdownReason) {
        let inner = &self.inner;
        let first = inner.state.send_if_modified(|state| {
            if state.is_winding_down() {
                false
            } else {
                *state = SessionState::Stopping;
                true
            }
        });
        if !first {
            debug!(?reason, "shutdown already in progress");
            return;
        }
        let _ = inner.stop_reason.set(reason);
        inner.engine.halt();

        if reason.is_fatal() {
            error!(
                session_id = %inner.session_id,
                certificate_id = %inner.settings.certificate_id,
                ?reason,
                "agent stopping; certified system loses active enforcement"
            );
        } else {
            info!(session_id = %inner.session_id, ?reason, "agent stopping");
        }

        // an in-flight start() finishes first, so its registry calls precede ours
        let _lifecycle = inner.lifecycle.lock().await;

        let tasks = std::mem::take(&mut *inner.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "background task ended abnormally");
            }
        }

        if reason.delivers_final_telemetry() {
            let revoked = match self.flush().await {
                FlushOutcome::Idle => false,
                FlushOutcome::Delivered { records } => {
                    info!(records, "final telemetry delivered");
                    false
                }
                FlushOutcome::Requeued { records, error } => {
                    warn!(records, error = %error, "final telemetry delivery failed; records undelivered");
                    false
                }
                FlushOutcome::Revoked { records } => {
                    error!(records, "registry rejected credential during final delivery; session end withheld");
                    true
                }
            };

            if !revoked && inner.started_at.get().is_some() {
                let end = SessionEnd {
                    session_id: inner.session_id,
                    ended_at: Utc::now(),
                    stats: inner.engine.stats(),
                };
                if let Err(err) =
                    bounded(inner.settings.request_timeout, inner.registry.end_session(&end)).await
                {
                    warn!(error = %err, "session end notification failed");
                }
            }
        } else {
            warn!(
                undelivered = inner.engine.journal().len(),
                "credential revoked; final telemetry withheld"
            );
        }

        if let Err(err) = inner.autostart.deregister() {
            warn!(error = %err, "autostart deregistration failed");
        }

        inner.state.send_replace(SessionState::Stopped);
        let stats = inner.engine.stats();
        info!(
            session_id = %inner.session_id,
            pass_count = stats.pass_count,
            block_count = stats.block_count,
            "agent stopped"
        );
    }

    /// Shut down from inside a background task without awaiting that task.
    fn spawn_shutdown(&self, reason: ShutdownReason) {
        let runtime = self.clone();
        tokio::spawn(async move { runtime.shutdown(reason).await });
    }

    /// Spawn a loop plus a watcher that tears the session down if it panics.
    fn spawn_loop<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = self.clone();
        let handle = tokio::spawn(task);
        tokio::spawn(async move {
            if let Err(err) = handle.await
                && err.is_panic()
            {
                error!(task = name, "background task panicked");
                runtime.spawn_shutdown(ShutdownReason::BackgroundFailure);
            }
        })
    }

    async fn sync_boundaries(&self) {
        let inner = &self.inner;
        let fetched = bounded(
            inner.settings.request_timeout,
            inner.registry.fetch_boundaries(&inner.settings.certificate_id),
        )
        .await;
        let local = inner.engine.boundaries().len();
        match fetched {
            Ok(boundaries) if boundaries.is_empty() => {
                warn!(local, "registry published no boundaries; keeping local defaults");
            }
            Ok(boundaries) => {
                let count = boundaries.len();
                match inner.engine.replace_boundaries(boundaries) {
                    Ok(()) => info!(count, "boundaries synced from registry"),
                    Err(err) => {
                        warn!(error = %err, local, "registry boundaries rejected; keeping local defaults");
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, local, "boundary sync failed; keeping local defaults");
            }
        }
    }

    async fn register_session(&self, started_at: DateTime<Utc>) {
        let inner = &self.inner;
        let registration = SessionRegistration {
            session_id: inner.session_id,
            started_at,
            certificate_id: &inner.settings.certificate_id,
            agent_version: &inner.settings.agent_version,
            boundaries: inner.engine.boundaries(),
        };
        match bounded(
            inner.settings.request_timeout,
            inner.registry.register_session(&registration),
        )
        .await
        {
            Ok(()) => info!(session_id = %inner.session_id, "session registered"),
            Err(err) => warn!(error = %err, "session registration failed; enforcing locally"),
        }
    }

    async fn flush(&self) -> FlushOutcome {
        let inner = &self.inner;
        flush_once(
            &inner.registry,
            inner.engine.journal(),
            BatchContext {
                certificate_id: &inner.settings.certificate_id,
                session_id: inner.session_id,
            },
            inner.engine.counters(),
            inner.settings.request_timeout,
        )
        .await
    }
}

async fn wait_for_stop(stop: &mut watch::Receiver<SessionState>) {
    let _ = stop.wait_for(|state| state.is_winding_down()).await;
}

async fn heartbeat_loop<R: Registry>(runtime: AgentRuntime<R>) {
    let inner = &runtime.inner;
    let period = inner.settings.heartbeat_interval;
    let mut stop = inner.state.subscribe();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut monitor = HeartbeatMonitor::new(inner.settings.failure_threshold);

    loop {
        tokio::select! {
            biased;
            _ = wait_for_stop(&mut stop) => break,
            _ = ticker.tick() => {}
        }

        let beat = Heartbeat {
            session_id: inner.session_id,
            certificate_id: &inner.settings.certificate_id,
            timestamp: Utc::now(),
            stats: inner.engine.stats(),
        };
        let outcome = bounded(inner.settings.request_timeout, inner.registry.heartbeat(&beat)).await;

        match monitor.observe(&outcome) {
            HeartbeatVerdict::Healthy => debug!("heartbeat acknowledged"),
            HeartbeatVerdict::Degraded { failures } => {
                let error = outcome.err().map(|e| e.to_string()).unwrap_or_default();
                warn!(
                    failures,
                    threshold = monitor.threshold(),
                    error,
                    "heartbeat failed"
                );
            }
            HeartbeatVerdict::Unreachable { failures } => {
                error!(failures, "registry unreachable; heartbeat threshold reached");
                runtime.spawn_shutdown(ShutdownReason::RegistryUnreachable);
                break;
            }
            HeartbeatVerdict::Revoked => {
                error!("registry rejected credential on heartbeat; stopping immediately");
                runtime.spawn_shutdown(ShutdownReason::CredentialRevoked);
                break;
            }
        }
    }
}

async fn flush_loop<R: Registry>(runtime: AgentRuntime<R>) {
    let inner = &runtime.inner;
    let period = inner.settings.flush_interval;
    let mut stop = inner.state.subscribe();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = wait_for_stop(&mut stop) => break,
            _ = ticker.tick() => {}
        }

        match runtime.flush().await {
            FlushOutcome::Idle => {}
            FlushOutcome::Delivered { records } => debug!(records, "telemetry delivered"),
            FlushOutcome::Requeued { records, error } => {
                warn!(
                    records,
                    pending = inner.engine.journal().len(),
                    error = %error,
                    "telemetry delivery failed; batch requeued"
                );
            }
            FlushOutcome::Revoked { records } => {
                error!(records, "registry rejected credential on telemetry flush; stopping immediately");
                runtime.spawn_shutdown(ShutdownReason::CredentialRevoked);
                break;
            }
        }
    }
}
