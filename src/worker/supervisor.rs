//! # Worker Supervisor
//!
//! Owns the single background execution context and everything that goes
//! with it:
//!
//! - **Reference counting**: [`WorkerSupervisor::lease`] retains the context,
//!   dropping the returned [`WorkerLease`] releases it. The context is created
//!   lazily on the first lease (circuit permitting) and torn down when the last
//!   lease goes away.
//! - **Readiness queue**: tasks dispatched before the context has spoken are
//!   held in FIFO order and flushed on its first message.
//! - **Routing**: `Complete` messages are always cached; they resolve the
//!   dispatching request and count as surfaced only when that request is still
//!   the active one for its cache key.
//! - **Watchdog**: every dispatch carries a clamped deadline. Expiry terminates
//!   the context, opens the circuit and fails every in-flight request over to
//!   the fallback engine.
//! - **Runtime errors**: tear the context down, open the circuit, send one
//!   rate-limited notification and hand the error back to the callers.
//!
//! ```text
//! Uninitialized ──lease──▶ Starting ──first message──▶ Ready
//!                             │                          │
//!                 init failure│          error / timeout │
//!                             ▼                          ▼
//!                          Degraded ◀────────────────────┘
//!                             │ cooldown elapsed + dispatch
//!                             └──────────▶ Starting
//! any state ──last lease dropped──▶ Terminated
//! ```

use super::context::{ContextFactory, ContextHandle};
use super::messages::{ProgressEvent, WorkerCommand, WorkerMessage, WorkerRequest};
use super::watchdog::Watchdog;
use crate::analysis::build_lineage;
use crate::cache::ResultCache;
use crate::config::InsightsConfig;
use crate::error::{InsightsError, InsightsResult};
use crate::fallback::{compute_fallback, FallbackEngine, FallbackReason};
use crate::models::{AnalysisReport, ComputeTask};
use crate::resilience::{
    CircuitBreakerMetrics, Notification, OpenReason, RateLimitedNotifier, WorkerCircuitBreaker,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of the managed execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No lease has ever been taken
    Uninitialized,
    /// Context created, waiting for its first message
    Starting,
    /// Context has signalled liveness and receives tasks directly
    Ready,
    /// No usable context; the circuit is or was open
    Degraded,
    /// All leases released, context torn down
    Terminated,
}

/// Tunables that can change while the supervisor runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Already clamped
    pub watchdog_timeout: Duration,
    pub heartbeat_rearm: bool,
}

impl SupervisorSettings {
    pub fn from_config(config: &InsightsConfig) -> Self {
        Self {
            watchdog_timeout: config.worker.watchdog_timeout(),
            heartbeat_rearm: config.worker.heartbeat_rearm,
        }
    }
}

/// How a dispatched request was resolved
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub report: AnalysisReport,
    /// True when this request was still the active one for its key
    pub surfaced: bool,
    /// True when the report came from the fallback engine after a timeout
    pub via_fallback: bool,
}

type DispatchResponder = oneshot::Sender<InsightsResult<DispatchOutcome>>;

/// Awaitable result of a dispatch
#[derive(Debug)]
pub struct DispatchTicket {
    request_id: Uuid,
    cache_key: String,
    receiver: oneshot::Receiver<InsightsResult<DispatchOutcome>>,
}

impl DispatchTicket {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Wait for the request to resolve. The report has already been cached
    /// when this returns `Ok`.
    pub async fn outcome(self) -> InsightsResult<DispatchOutcome> {
        self.receiver.await.unwrap_or_else(|_| {
            Err(InsightsError::BackgroundUnitUnavailable(
                "dispatch dropped before completion".to_string(),
            ))
        })
    }
}

struct InFlight {
    task: Arc<ComputeTask>,
    responder: DispatchResponder,
    watchdog: Option<Watchdog>,
}

struct SupervisorState {
    lifecycle: LifecycleState,
    context: Option<ContextHandle>,
    /// Incremented per created context; messages from older ones are ignored
    generation: u64,
    ref_count: usize,
    ready: bool,
    pending: VecDeque<WorkerRequest>,
    in_flight: HashMap<Uuid, InFlight>,
    /// Latest request per cache key
    active: HashMap<String, Uuid>,
    settings: SupervisorSettings,
}

struct SupervisorInner {
    name: String,
    state: Mutex<SupervisorState>,
    factory: Arc<dyn ContextFactory>,
    circuit: WorkerCircuitBreaker,
    cache: Arc<ResultCache<AnalysisReport>>,
    fallback: Arc<dyn FallbackEngine>,
    notifier: Arc<RateLimitedNotifier>,
    progress: broadcast::Sender<ProgressEvent>,
}

/// Cheaply cloneable handle to the shared supervisor
#[derive(Clone)]
pub struct WorkerSupervisor {
    inner: Arc<SupervisorInner>,
}

impl std::fmt::Debug for WorkerSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("WorkerSupervisor")
            .field("name", &self.inner.name)
            .field("lifecycle", &state.lifecycle)
            .field("generation", &state.generation)
            .field("ref_count", &state.ref_count)
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

impl WorkerSupervisor {
    pub fn new(
        factory: Arc<dyn ContextFactory>,
        cache: Arc<ResultCache<AnalysisReport>>,
        fallback: Arc<dyn FallbackEngine>,
        notifier: Arc<RateLimitedNotifier>,
        config: &InsightsConfig,
    ) -> Self {
        let name = "insights_worker".to_string();
        let (progress, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SupervisorInner {
                circuit: WorkerCircuitBreaker::new(
                    name.clone(),
                    config.circuit_breaker.to_resilience_config(),
                ),
                name,
                state: Mutex::new(SupervisorState {
                    lifecycle: LifecycleState::Uninitialized,
                    context: None,
                    generation: 0,
                    ref_count: 0,
                    ready: false,
                    pending: VecDeque::new(),
                    in_flight: HashMap::new(),
                    active: HashMap::new(),
                    settings: SupervisorSettings::from_config(config),
                }),
                factory,
                cache,
                fallback,
                notifier,
                progress,
            }),
        }
    }

    /// Take a reference on the context, creating it on the 0 → 1 transition
    /// if the circuit is closed.
    pub fn retain(&self) {
        let mut state = self.inner.state.lock();
        state.ref_count += 1;
        crate::log_worker!(debug, "retain", ref_count = state.ref_count, "Worker retained");
        if state.ref_count == 1 && state.context.is_none() {
            self.inner.start_context(&mut state);
        }
    }

    /// Drop a reference; the last release terminates the context and fails
    /// any unresolved requests as unavailable.
    pub fn release(&self) {
        let mut state = self.inner.state.lock();
        if state.ref_count == 0 {
            warn!(component = %self.inner.name, "release() without matching retain()");
            return;
        }
        state.ref_count -= 1;
        crate::log_worker!(debug, "release", ref_count = state.ref_count, "Worker released");
        if state.ref_count > 0 {
            return;
        }

        let orphans = self.inner.teardown(&mut state, LifecycleState::Terminated);
        drop(state);
        info!(component = %self.inner.name, orphaned = orphans.len(), "🛑 Execution context terminated (no leases left)");
        for (flight, _) in orphans {
            let _ = flight.responder.send(Err(InsightsError::BackgroundUnitUnavailable(
                "worker released".to_string(),
            )));
        }
    }

    /// RAII wrapper around [`retain`](Self::retain) / [`release`](Self::release)
    pub fn lease(&self) -> WorkerLease {
        self.retain();
        WorkerLease {
            supervisor: self.clone(),
        }
    }

    /// Send a task to the execution context.
    ///
    /// Returns `BackgroundUnitUnavailable` without touching the context when
    /// the circuit is open, nobody holds a lease, or a context cannot be
    /// created; the caller is expected to fall back. Must be called from
    /// within a tokio runtime.
    pub fn dispatch(&self, task: Arc<ComputeTask>) -> InsightsResult<DispatchTicket> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        if state.ref_count == 0 {
            return Err(InsightsError::BackgroundUnitUnavailable(
                "worker has no active leases".to_string(),
            ));
        }
        if !inner.circuit.allows_dispatch() {
            if state.context.is_none() {
                state.lifecycle = LifecycleState::Degraded;
            }
            return Err(InsightsError::BackgroundUnitUnavailable(
                "worker circuit is open".to_string(),
            ));
        }
        if state.context.is_none() && !inner.start_context(&mut state) {
            return Err(InsightsError::BackgroundUnitUnavailable(
                "execution context could not be started".to_string(),
            ));
        }

        let request_id = Uuid::new_v4();
        let cache_key = task.cache_key().to_string();
        let (responder, receiver) = oneshot::channel();
        let watchdog = inner.arm_watchdog(request_id, state.settings.watchdog_timeout);

        // Prewarm tasks never become the active request, so they resolve unsurfaced
        if !task.is_prewarm() {
            if let Some(previous) = state.active.insert(cache_key.clone(), request_id) {
                debug!(cache_key = %cache_key, superseded = %previous, "Superseding earlier request for key");
            }
        }
        state.in_flight.insert(
            request_id,
            InFlight {
                task: Arc::clone(&task),
                responder,
                watchdog: Some(watchdog),
            },
        );

        let request = WorkerRequest { request_id, task };
        if state.ready {
            let sent = state
                .context
                .as_ref()
                .map(|context| context.send(WorkerCommand::Compute(request)));
            if !matches!(sent, Some(Ok(()))) {
                inner.fail_context(state, OpenReason::RuntimeError, "execution context stopped accepting work");
            }
        } else {
            state.pending.push_back(request);
            crate::log_worker!(
                debug,
                "queue",
                cache_key = %cache_key,
                request_id = %request_id,
                pending = state.pending.len(),
                "Queued task until context is ready"
            );
        }

        Ok(DispatchTicket {
            request_id,
            cache_key,
            receiver,
        })
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.inner.state.lock().lifecycle
    }

    pub fn ref_count(&self) -> usize {
        self.inner.state.lock().ref_count
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().ready
    }

    pub fn has_context(&self) -> bool {
        self.inner.state.lock().context.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    pub fn circuit(&self) -> &WorkerCircuitBreaker {
        &self.inner.circuit
    }

    pub fn circuit_metrics(&self) -> CircuitBreakerMetrics {
        self.inner.circuit.metrics()
    }

    pub fn cache(&self) -> Arc<ResultCache<AnalysisReport>> {
        Arc::clone(&self.inner.cache)
    }

    pub fn notifier(&self) -> Arc<RateLimitedNotifier> {
        Arc::clone(&self.inner.notifier)
    }

    /// Progress and partial results from the context
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.progress.subscribe()
    }

    /// Apply hot-swapped configuration to timing and cooldowns
    pub fn apply_config(&self, config: &InsightsConfig) {
        self.inner.state.lock().settings = SupervisorSettings::from_config(config);
        self.inner
            .circuit
            .update_policy(config.circuit_breaker.to_resilience_config());
        self.inner
            .notifier
            .set_window(config.circuit_breaker.notification_window());
    }
}

impl SupervisorInner {
    /// Create a context and its router. On failure the circuit opens with
    /// `InitFailure` and the supervisor degrades.
    fn start_context(self: &Arc<Self>, state: &mut SupervisorState) -> bool {
        if self.circuit.is_open() {
            state.lifecycle = LifecycleState::Degraded;
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.init_failed(state, &format!("no async runtime available: {e}"));
                return false;
            }
        };

        let mut context = match self.factory.spawn() {
            Ok(context) => context,
            Err(e) => {
                self.init_failed(state, &e.to_string());
                return false;
            }
        };
        let Some(messages) = context.take_messages() else {
            context.terminate();
            self.init_failed(state, "execution context has no message stream");
            return false;
        };

        state.generation += 1;
        let generation = state.generation;
        runtime.spawn(route_messages(Arc::downgrade(self), generation, messages));
        state.context = Some(context);
        state.ready = false;
        state.lifecycle = LifecycleState::Starting;

        crate::log_worker!(info, "start", generation = generation, "🚀 Execution context starting");
        true
    }

    fn init_failed(&self, state: &mut SupervisorState, error: &str) {
        state.lifecycle = LifecycleState::Degraded;
        self.circuit.trip(OpenReason::InitFailure);
        warn!(component = %self.name, error = %error, "Execution context failed to start");
    }

    fn arm_watchdog(self: &Arc<Self>, request_id: Uuid, timeout: Duration) -> Watchdog {
        let weak = Arc::downgrade(self);
        Watchdog::arm(timeout, async move {
            if let Some(inner) = weak.upgrade() {
                inner.watchdog_expired(request_id, timeout).await;
            }
        })
    }

    /// Terminate the context and drain all request state. Returned requests
    /// are paired with whether they were the active request for their key.
    fn teardown(&self, state: &mut SupervisorState, next: LifecycleState) -> Vec<(InFlight, bool)> {
        if let Some(context) = state.context.take() {
            context.terminate();
        }
        state.ready = false;
        state.lifecycle = next;
        state.pending.clear();

        let active = std::mem::take(&mut state.active);
        state
            .in_flight
            .drain()
            .map(|(id, mut flight)| {
                flight.watchdog = None;
                let surfaced = active.get(flight.task.cache_key()) == Some(&id);
                (flight, surfaced)
            })
            .collect()
    }

    /// Runtime failure: tear down, open the circuit, notify once, and hand
    /// the error to every unresolved request.
    fn fail_context(
        &self,
        mut state: parking_lot::MutexGuard<'_, SupervisorState>,
        reason: OpenReason,
        message: &str,
    ) {
        let generation = state.generation;
        let orphans = self.teardown(&mut state, LifecycleState::Degraded);
        drop(state);

        self.circuit.trip(reason);
        warn!(
            component = %self.name,
            generation = generation,
            reason = %reason,
            error = %message,
            in_flight = orphans.len(),
            "💥 Execution context failed"
        );
        self.notifier.notify(&Notification::worker_fallback(format!(
            "Background analysis failed ({message}); using fallback mode."
        )));

        for (flight, _) in orphans {
            let _ = flight
                .responder
                .send(Err(InsightsError::BackgroundUnitRuntimeError(message.to_string())));
        }
    }

    fn flush_pending(&self, state: &mut SupervisorState) {
        let flushed = state.pending.len();
        while let Some(request) = state.pending.pop_front() {
            let Some(context) = state.context.as_ref() else {
                break;
            };
            if context.send(WorkerCommand::Compute(request)).is_err() {
                // The router sees the closed stream and fails the context
                break;
            }
        }
        if flushed > 0 {
            crate::log_worker!(debug, "flush", flushed = flushed, "Flushed pending tasks in arrival order");
        }
    }

    fn rearm(self: &Arc<Self>, state: &mut SupervisorState, request_id: Option<Uuid>, cache_key: Option<&str>) {
        if !state.settings.heartbeat_rearm {
            return;
        }
        let timeout = state.settings.watchdog_timeout;
        let targets: Vec<Uuid> = match (request_id, cache_key) {
            (Some(id), _) => vec![id],
            (None, Some(key)) => state
                .in_flight
                .iter()
                .filter(|(_, flight)| flight.task.cache_key() == key)
                .map(|(id, _)| *id)
                .collect(),
            (None, None) => Vec::new(),
        };
        for id in targets {
            if state.in_flight.contains_key(&id) {
                let watchdog = self.arm_watchdog(id, timeout);
                if let Some(flight) = state.in_flight.get_mut(&id) {
                    flight.watchdog = Some(watchdog);
                }
            }
        }
    }

    fn handle_message(self: &Arc<Self>, generation: u64, message: WorkerMessage) {
        let mut state = self.state.lock();
        if state.generation != generation || state.context.is_none() {
            debug!(generation = generation, kind = message.kind(), "Ignoring message from retired context");
            return;
        }

        if !state.ready {
            state.ready = true;
            state.lifecycle = LifecycleState::Ready;
            crate::log_worker!(info, "ready", generation = generation, "✅ Execution context ready");
            self.flush_pending(&mut state);
        }

        match message {
            WorkerMessage::Progress {
                cache_key,
                request_id,
                stage,
                percent,
            } => {
                self.rearm(&mut state, request_id, cache_key.as_deref());
                drop(state);
                let _ = self.progress.send(ProgressEvent::Progress {
                    cache_key,
                    stage,
                    percent,
                });
            }
            WorkerMessage::Partial {
                cache_key,
                request_id,
                payload,
            } => {
                self.rearm(&mut state, Some(request_id), Some(&cache_key));
                drop(state);
                let _ = self.progress.send(ProgressEvent::Partial {
                    cache_key,
                    report: payload,
                });
            }
            WorkerMessage::Complete {
                cache_key,
                request_id,
                report,
            } => {
                let flight = state.in_flight.remove(&request_id);
                let surfaced = state.active.get(&cache_key) == Some(&request_id);
                if surfaced {
                    state.active.remove(&cache_key);
                }
                drop(state);

                let mut report = report.normalized();
                report.cache_key = Some(cache_key.clone());
                if report.data_lineage.is_empty() {
                    if let Some(flight) = &flight {
                        report.data_lineage = build_lineage(flight.task.inputs());
                    }
                }
                let (tags, ttl) = flight
                    .as_ref()
                    .map(|f| (f.task.tags().clone(), Some(f.task.ttl())))
                    .unwrap_or_default();
                self.cache.set(&cache_key, report.clone(), tags, ttl);

                crate::log_worker!(
                    debug,
                    "complete",
                    cache_key = %cache_key,
                    request_id = %request_id,
                    surfaced = surfaced,
                    "Result received and cached"
                );

                match flight {
                    Some(flight) => {
                        let _ = flight.responder.send(Ok(DispatchOutcome {
                            report,
                            surfaced,
                            via_fallback: false,
                        }));
                    }
                    None => debug!(request_id = %request_id, "Completion for unknown request cached only"),
                }
            }
            WorkerMessage::Error { message, .. } => {
                self.fail_context(state, OpenReason::RuntimeError, &message);
            }
        }
    }

    /// The context's message stream closed
    fn handle_context_exit(&self, generation: u64) {
        let state = self.state.lock();
        if state.generation != generation || state.context.is_none() {
            return;
        }
        self.fail_context(state, OpenReason::RuntimeError, "execution context exited unexpectedly");
    }

    async fn watchdog_expired(self: Arc<Self>, request_id: Uuid, timeout: Duration) {
        let orphans = {
            let mut state = self.state.lock();
            if !state.in_flight.contains_key(&request_id) {
                return;
            }
            warn!(
                component = %self.name,
                request_id = %request_id,
                timeout_ms = timeout.as_millis() as u64,
                generation = state.generation,
                "⏰ Watchdog expired; terminating execution context"
            );
            self.teardown(&mut state, LifecycleState::Degraded)
        };

        self.circuit.trip(OpenReason::Timeout);
        self.notifier.notify(&Notification::worker_fallback(
            "Background analysis timed out; using fallback mode.",
        ));

        let failovers = orphans
            .into_iter()
            .map(|(flight, surfaced)| self.fail_over(flight, surfaced));
        futures::future::join_all(failovers).await;
    }

    /// Compute a fallback report for a request whose context was killed
    async fn fail_over(&self, flight: InFlight, surfaced: bool) {
        let task = &flight.task;
        let mut report =
            compute_fallback(self.fallback.as_ref(), task.inputs(), FallbackReason::WatchdogTimeout).await;
        report.cache_key = Some(task.cache_key().to_string());
        self.cache
            .set(task.cache_key(), report.clone(), task.tags().clone(), Some(task.ttl()));
        let _ = flight.responder.send(Ok(DispatchOutcome {
            report,
            surfaced,
            via_fallback: true,
        }));
    }
}

impl Drop for SupervisorInner {
    fn drop(&mut self) {
        if let Some(context) = self.state.get_mut().context.take() {
            context.terminate();
        }
    }
}

async fn route_messages(
    inner: Weak<SupervisorInner>,
    generation: u64,
    mut messages: mpsc::UnboundedReceiver<WorkerMessage>,
) {
    while let Some(message) = messages.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.handle_message(generation, message);
    }
    if let Some(inner) = inner.upgrade() {
        inner.handle_context_exit(generation);
    }
}

/// Keeps the execution context alive while held
#[derive(Debug)]
#[must_use = "dropping a WorkerLease releases the worker immediately"]
pub struct WorkerLease {
    supervisor: WorkerSupervisor,
}

impl WorkerLease {
    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        self.supervisor.release();
    }
}
