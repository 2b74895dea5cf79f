//! # Insights Orchestrator
//!
//! The facade callers use. Every request walks the same phases:
//!
//! ```text
//! Idle → CacheCheck ─hit──────────────────────────────▶ Done
//!             └─miss─▶ Dispatch (worker | remote | fallback) → CacheWrite → Done
//! ```
//!
//! Only invalid input is returned as an error. Every other failure is
//! recovered into a caveated report, with a rate-limited notification for
//! systemic problems.

use super::tags::{derive_tags, student_tag};
use crate::cache::{CacheStats, ResultCache};
use crate::config::{ConfigProvider, FingerprintConfig, InsightsConfig, Subscription};
use crate::constants::tags;
use crate::error::{InsightsError, InsightsResult};
use crate::fallback::{compute_fallback, FallbackEngine, FallbackReason, HeuristicFallbackEngine};
use crate::fingerprint::FingerprintBuilder;
use crate::models::{AnalysisInputs, AnalysisReport, ComputeTask, SubmitOptions};
use crate::pipeline::{
    select_strategy, AnalysisStrategy, ChunkedAnalysisPipeline, PipelineError, SinglePassAnalysis,
};
use crate::remote::RemoteModelClient;
use crate::resilience::{
    CircuitBreakerMetrics, Notification, Notifier, RateLimitedNotifier, RateLimiter, TracingNotifier,
};
use crate::validation::{ReportValidator, SchemaRepairValidator};
use crate::worker::{ContextFactory, WorkerLease, WorkerSupervisor};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Phases of one `submit` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    CacheCheck,
    Dispatch,
    CacheWrite,
    Done,
}

impl RequestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestPhase::Idle => "idle",
            RequestPhase::CacheCheck => "cache_check",
            RequestPhase::Dispatch => "dispatch",
            RequestPhase::CacheWrite => "cache_write",
            RequestPhase::Done => "done",
        }
    }
}

/// Relevant config plus the compute mode; both select distinct results
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyConfig<'a> {
    #[serde(flatten)]
    config: FingerprintConfig<'a>,
    use_remote_model: bool,
}

struct Resolved {
    report: AnalysisReport,
    /// Already written by the worker supervisor
    cached: bool,
    /// The supervisor's last-request-wins verdict, worker path only
    surfaced: Option<bool>,
}

/// Builder for [`InsightsOrchestrator`]
pub struct InsightsOrchestratorBuilder {
    provider: Arc<ConfigProvider>,
    context_factory: Option<Arc<dyn ContextFactory>>,
    supervisor: Option<WorkerSupervisor>,
    fallback: Option<Arc<dyn FallbackEngine>>,
    remote: Option<Arc<dyn RemoteModelClient>>,
    validator: Option<Arc<dyn ReportValidator>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl InsightsOrchestratorBuilder {
    /// Background execution contexts are created through `factory`
    pub fn context_factory(mut self, factory: Arc<dyn ContextFactory>) -> Self {
        self.context_factory = Some(factory);
        self
    }

    /// Share an existing supervisor, together with its cache, fallback engine
    /// and notifier, between several orchestrators
    pub fn supervisor(mut self, supervisor: WorkerSupervisor) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn fallback(mut self, engine: Arc<dyn FallbackEngine>) -> Self {
        self.fallback = Some(engine);
        self
    }

    pub fn remote_client(mut self, client: Arc<dyn RemoteModelClient>) -> Self {
        self.remote = Some(client);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn ReportValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Assemble the orchestrator. When the worker is enabled this takes a
    /// lease and starts the execution context, so call it inside a tokio
    /// runtime.
    pub fn build(self) -> InsightsResult<InsightsOrchestrator> {
        let config = self.provider.current();
        config.validate()?;

        let fallback: Arc<dyn FallbackEngine> = self
            .fallback
            .unwrap_or_else(|| Arc::new(HeuristicFallbackEngine::new(config.confidence.clone())));

        let (supervisor, cache, notifier) = match (self.supervisor, self.context_factory) {
            (Some(supervisor), _) => {
                let cache = supervisor.cache();
                let notifier = supervisor.notifier();
                (Some(supervisor), cache, notifier)
            }
            (None, factory) => {
                let cache = Arc::new(ResultCache::from_config(&config.cache));
                let inner: Arc<dyn Notifier> = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));
                let notifier = Arc::new(RateLimitedNotifier::new(
                    inner,
                    config.circuit_breaker.notification_window(),
                ));
                let supervisor = factory.map(|factory| {
                    WorkerSupervisor::new(
                        factory,
                        Arc::clone(&cache),
                        Arc::clone(&fallback),
                        Arc::clone(&notifier),
                        &config,
                    )
                });
                (supervisor, cache, notifier)
            }
        };

        let lease = Arc::new(Mutex::new(match &supervisor {
            Some(supervisor) if config.worker.enabled => Some(supervisor.lease()),
            _ => None,
        }));

        let subscription = self.provider.subscribe({
            let cache = Arc::clone(&cache);
            let supervisor = supervisor.clone();
            let lease = Arc::clone(&lease);
            let notifier = Arc::clone(&notifier);
            move |config: &InsightsConfig| {
                apply_config_change(config, &cache, supervisor.as_ref(), &lease, &notifier)
            }
        });

        info!(
            worker_enabled = config.worker.enabled,
            has_worker = supervisor.is_some(),
            remote_enabled = config.remote.enabled && self.remote.is_some(),
            "✅ Insights orchestrator ready"
        );

        let (results, _) = watch::channel(None);
        Ok(InsightsOrchestrator {
            log_limiter: RateLimiter::new(config.circuit_breaker.notification_window()),
            provider: self.provider,
            cache,
            supervisor,
            lease,
            fallback,
            remote: self.remote,
            validator: self
                .validator
                .unwrap_or_else(|| Arc::new(SchemaRepairValidator)),
            notifier,
            results,
            active: Mutex::new(HashMap::new()),
            next_request: AtomicU64::new(1),
            _subscription: subscription,
        })
    }
}

fn apply_config_change(
    config: &InsightsConfig,
    cache: &ResultCache<AnalysisReport>,
    supervisor: Option<&WorkerSupervisor>,
    lease: &Mutex<Option<WorkerLease>>,
    notifier: &RateLimitedNotifier,
) {
    cache.apply_config(&config.cache);
    notifier.set_window(config.circuit_breaker.notification_window());

    if let Some(supervisor) = supervisor {
        supervisor.apply_config(config);
        let mut lease = lease.lock();
        match (config.worker.enabled, lease.is_some()) {
            (true, false) => *lease = Some(supervisor.lease()),
            (false, true) => *lease = None,
            _ => {}
        }
    }

    if config.cache.invalidate_on_config_change {
        let removed = cache.invalidate_by_tag(tags::WILDCARD);
        info!(removed = removed, "Cache invalidated after configuration change");
    }
}

/// Facade over cache, worker, remote pipelines and fallback
pub struct InsightsOrchestrator {
    provider: Arc<ConfigProvider>,
    cache: Arc<ResultCache<AnalysisReport>>,
    supervisor: Option<WorkerSupervisor>,
    lease: Arc<Mutex<Option<WorkerLease>>>,
    fallback: Arc<dyn FallbackEngine>,
    remote: Option<Arc<dyn RemoteModelClient>>,
    validator: Arc<dyn ReportValidator>,
    notifier: Arc<RateLimitedNotifier>,
    /// Latest surfaced report
    results: watch::Sender<Option<Arc<AnalysisReport>>>,
    /// Latest request sequence per cache key, for paths that bypass the supervisor
    active: Mutex<HashMap<String, u64>>,
    next_request: AtomicU64,
    log_limiter: RateLimiter,
    _subscription: Subscription,
}

impl std::fmt::Debug for InsightsOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightsOrchestrator")
            .field("cache_size", &self.cache.len())
            .field("supervisor", &self.supervisor)
            .field("has_lease", &self.lease.lock().is_some())
            .field("has_remote", &self.remote.is_some())
            .finish()
    }
}

impl InsightsOrchestrator {
    pub fn builder(provider: Arc<ConfigProvider>) -> InsightsOrchestratorBuilder {
        InsightsOrchestratorBuilder {
            provider,
            context_factory: None,
            supervisor: None,
            fallback: None,
            remote: None,
            validator: None,
            notifier: None,
        }
    }

    /// Compute (or fetch) the report for `inputs`
    pub async fn submit(
        &self,
        inputs: AnalysisInputs,
        options: SubmitOptions,
    ) -> InsightsResult<AnalysisReport> {
        self.trace_phase(RequestPhase::Idle, &inputs.student_id);
        inputs.validate()?;

        let config = self.provider.current();
        let cache_key = self.cache_key(&inputs, &config, options.use_remote_model)?;

        self.trace_phase(RequestPhase::CacheCheck, &cache_key);
        if !options.bypass_cache {
            if let Some(report) = self.cache.get(&cache_key) {
                if self.log_limiter.allow("cache-hit") {
                    crate::log_cache!(debug, "hit", cache_key = %cache_key, "Serving cached report");
                }
                if !options.is_prewarm {
                    self.publish(&report);
                }
                self.trace_phase(RequestPhase::Done, &cache_key);
                return Ok(report);
            }
        }

        let sequence = self.begin_request(&cache_key, options.is_prewarm);
        let ttl = options.ttl_override.unwrap_or_else(|| config.cache.ttl());
        let task_tags = derive_tags(&inputs, config.cache.schema_version, Utc::now());

        let mut strategy = select_strategy(&inputs, &options, &config);
        if strategy.is_remote() && self.remote.is_none() {
            debug!(cache_key = %cache_key, "No remote client configured; using worker path");
            strategy = AnalysisStrategy::Worker;
        }

        self.trace_phase(RequestPhase::Dispatch, &cache_key);
        crate::log_pipeline!(
            debug,
            "dispatch",
            cache_key = %cache_key,
            strategy = %strategy,
            prewarm = options.is_prewarm,
            "Dispatching request"
        );
        let resolved = match strategy {
            AnalysisStrategy::Worker => {
                self.run_worker(&inputs, &cache_key, ttl, task_tags.clone(), &options, &config)
                    .await
            }
            AnalysisStrategy::RemoteSinglePass | AnalysisStrategy::RemoteChunked => {
                self.run_remote(strategy, &inputs, &config).await
            }
        };

        let mut report = resolved.report;
        if !resolved.cached {
            self.trace_phase(RequestPhase::CacheWrite, &cache_key);
            report.cache_key = Some(cache_key.clone());
            self.cache
                .set(&cache_key, report.clone(), task_tags, Some(ttl));
        }

        let latest = sequence.is_some_and(|sequence| self.finish_request(&cache_key, sequence));
        let surfaced = resolved.surfaced.unwrap_or(latest);
        if surfaced && !options.is_prewarm {
            self.publish(&report);
        }

        self.trace_phase(RequestPhase::Done, &cache_key);
        Ok(report)
    }

    async fn run_worker(
        &self,
        inputs: &AnalysisInputs,
        cache_key: &str,
        ttl: Duration,
        task_tags: BTreeSet<String>,
        options: &SubmitOptions,
        config: &InsightsConfig,
    ) -> Resolved {
        if !config.worker.enabled {
            self.notifier.notify(&Notification::worker_disabled());
            return self.fall_back(inputs, FallbackReason::WorkerDisabled).await;
        }
        let Some(supervisor) = &self.supervisor else {
            return self.fall_back(inputs, FallbackReason::WorkerUnavailable).await;
        };

        let task = Arc::new(ComputeTask::new(
            inputs.clone(),
            cache_key,
            ttl,
            task_tags,
            options.is_prewarm,
        ));
        let ticket = match supervisor.dispatch(task) {
            Ok(ticket) => ticket,
            Err(e) => {
                debug!(cache_key = %cache_key, error = %e, "Worker dispatch refused");
                self.notifier.notify(&Notification::worker_fallback(
                    "Background analysis is unavailable; using fallback mode.",
                ));
                return self.fall_back(inputs, FallbackReason::WorkerUnavailable).await;
            }
        };

        match ticket.outcome().await {
            Ok(outcome) => Resolved {
                report: outcome.report,
                cached: true,
                surfaced: Some(outcome.surfaced),
            },
            Err(InsightsError::BackgroundUnitRuntimeError(message)) => {
                debug!(cache_key = %cache_key, error = %message, "Worker failed mid-flight");
                self.fall_back(inputs, FallbackReason::WorkerRuntimeError).await
            }
            Err(e) => {
                debug!(cache_key = %cache_key, error = %e, "Worker dropped request");
                self.fall_back(inputs, FallbackReason::WorkerUnavailable).await
            }
        }
    }

    async fn run_remote(
        &self,
        strategy: AnalysisStrategy,
        inputs: &AnalysisInputs,
        config: &InsightsConfig,
    ) -> Resolved {
        let Some(client) = &self.remote else {
            return self.fall_back(inputs, FallbackReason::RemoteFailure).await;
        };
        let client = Arc::clone(client);
        let validator = Arc::clone(&self.validator);

        let result = match strategy {
            AnalysisStrategy::RemoteChunked => {
                ChunkedAnalysisPipeline::new(client, validator, config)
                    .run(inputs)
                    .await
            }
            _ => SinglePassAnalysis::new(client, validator, config).run(inputs).await,
        };

        match result {
            Ok(report) => Resolved {
                report,
                cached: false,
                surfaced: None,
            },
            Err(PipelineError::InsufficientData) => {
                self.fall_back(inputs, FallbackReason::InsufficientData).await
            }
            Err(e) => {
                warn!(student_id = %inputs.student_id, strategy = %strategy, error = %e, "Remote analysis failed");
                self.notifier
                    .notify(&Notification::remote_degraded(e.to_string()));
                self.fall_back(inputs, FallbackReason::RemoteFailure).await
            }
        }
    }

    async fn fall_back(&self, inputs: &AnalysisInputs, reason: FallbackReason) -> Resolved {
        if self.log_limiter.allow(&format!("fallback:{}", reason.as_str())) {
            info!(reason = reason.as_str(), "Computing with fallback engine");
        }
        Resolved {
            report: compute_fallback(self.fallback.as_ref(), inputs, reason).await,
            cached: false,
            surfaced: None,
        }
    }

    fn cache_key(
        &self,
        inputs: &AnalysisInputs,
        config: &InsightsConfig,
        use_remote_model: bool,
    ) -> InsightsResult<String> {
        FingerprintBuilder::new(config.cache.schema_version).build_key(
            inputs,
            &KeyConfig {
                config: config.fingerprint_subset(),
                use_remote_model,
            },
        )
    }

    /// Record the latest caller-visible request for `cache_key`. Prewarm
    /// requests are never recorded and so never supersede a real one.
    fn begin_request(&self, cache_key: &str, is_prewarm: bool) -> Option<u64> {
        if is_prewarm {
            return None;
        }
        let sequence = self.next_request.fetch_add(1, Ordering::Relaxed);
        self.active.lock().insert(cache_key.to_string(), sequence);
        Some(sequence)
    }

    /// Whether `sequence` was still the latest request for its key
    fn finish_request(&self, cache_key: &str, sequence: u64) -> bool {
        let mut active = self.active.lock();
        if active.get(cache_key) == Some(&sequence) {
            active.remove(cache_key);
            true
        } else {
            false
        }
    }

    fn publish(&self, report: &AnalysisReport) {
        self.results.send_replace(Some(Arc::new(report.clone())));
    }

    fn trace_phase(&self, phase: RequestPhase, subject: &str) {
        crate::log_pipeline!(trace, "request_phase", phase = phase.as_str(), subject = %subject, "Request phase");
    }

    /// Drop entries carrying `tag`; `"*"` clears everything
    pub fn invalidate(&self, tag: &str) -> usize {
        let removed = self.cache.invalidate_by_tag(tag);
        crate::log_cache!(info, "invalidate", tag = %tag, removed = removed, "Invalidated cache entries");
        removed
    }

    pub fn invalidate_student(&self, student_id: &str) -> usize {
        self.invalidate(&student_tag(student_id))
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Populate the cache ahead of anticipated requests. Cached datasets are
    /// skipped; the rest run one after another, `prewarm_stagger` apart.
    /// Returns how many were scheduled.
    pub async fn prewarm<I>(&self, datasets: I) -> usize
    where
        I: IntoIterator<Item = AnalysisInputs>,
    {
        let config = self.provider.current();
        let stagger = config.worker.prewarm_stagger();
        let mut scheduled = 0;

        for inputs in datasets {
            if let Err(e) = inputs.validate() {
                warn!(error = %e, "Skipping invalid prewarm dataset");
                continue;
            }
            let cache_key = match self.cache_key(&inputs, &config, false) {
                Ok(key) => key,
                Err(e) => {
                    warn!(error = %e, "Skipping unfingerprintable prewarm dataset");
                    continue;
                }
            };
            if self.cache.contains(&cache_key) {
                continue;
            }

            if scheduled > 0 {
                tokio::time::sleep(stagger).await;
            }
            scheduled += 1;
            if let Err(e) = self.submit(inputs, SubmitOptions::prewarm()).await {
                warn!(cache_key = %cache_key, error = %e, "Prewarm request failed");
            }
        }

        crate::log_pipeline!(info, "prewarm", scheduled = scheduled, "Prewarm finished");
        scheduled
    }

    /// Latest surfaced report; prewarm and superseded results never appear
    pub fn subscribe_results(&self) -> watch::Receiver<Option<Arc<AnalysisReport>>> {
        self.results.subscribe()
    }

    pub fn config(&self) -> Arc<InsightsConfig> {
        self.provider.current()
    }

    pub fn supervisor(&self) -> Option<&WorkerSupervisor> {
        self.supervisor.as_ref()
    }

    pub fn circuit_metrics(&self) -> Option<CircuitBreakerMetrics> {
        self.supervisor.as_ref().map(WorkerSupervisor::circuit_metrics)
    }

    pub fn holds_worker_lease(&self) -> bool {
        self.lease.lock().is_some()
    }
}
