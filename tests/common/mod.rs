//! Shared fakes and builders for integration tests.
#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use insights_core::config::{ConfigProvider, InsightsConfig};
use insights_core::models::{
    AnalysisInputs, AnalysisReport, ComputeTask, EmotionEntry, SensoryEntry, TimeRange,
    TrackingEntry,
};
use insights_core::orchestration::InsightsOrchestrator;
use insights_core::remote::{Prompt, RemoteCallError, RemoteModelClient};
use insights_core::resilience::{Notification, NotificationKind, Notifier};
use insights_core::worker::{ComputeEngine, ProgressReporter, TaskContextFactory};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Student ids with these prefixes change how [`ScriptedEngine`] behaves
pub const HANG_PREFIX: &str = "hang-";
pub const CRASH_PREFIX: &str = "crash-";
pub const SLOW_PREFIX: &str = "slow-";

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
}

pub fn emotion(student: &str, day: i64, label: &str) -> EmotionEntry {
    EmotionEntry {
        id: format!("{student}-e{day}"),
        student_id: student.to_string(),
        timestamp: base_time() + Duration::days(day),
        emotion: label.to_string(),
        intensity: Some(3.0),
        triggers: vec![],
    }
}

pub fn sensory(student: &str, day: i64, response: &str) -> SensoryEntry {
    SensoryEntry {
        id: format!("{student}-s{day}"),
        student_id: student.to_string(),
        timestamp: base_time() + Duration::days(day),
        sensory_type: "auditory".to_string(),
        response: response.to_string(),
        intensity: Some(2.0),
    }
}

pub fn session(student: &str, day: i64) -> TrackingEntry {
    TrackingEntry {
        id: format!("{student}-t{day}"),
        student_id: student.to_string(),
        timestamp: base_time() + Duration::days(day),
        emotions: vec![emotion(student, day, "focused")],
        sensory_inputs: vec![],
        environment: Some("classroom".to_string()),
        notes: None,
    }
}

/// A small dataset spanning a couple of weeks
pub fn small_dataset(student: &str) -> AnalysisInputs {
    let mut inputs = AnalysisInputs::new(student);
    inputs.emotions = (0..6).map(|d| emotion(student, d, "calm")).collect();
    inputs.sensory_inputs = (0..4).map(|d| sensory(student, d, "seeking")).collect();
    inputs.entries = (0..3).map(|d| session(student, d)).collect();
    inputs
}

/// Records in two clusters inside an explicit range of `range_days`
pub fn clustered_dataset(student: &str, range_days: i64, clusters: &[(i64, i64)]) -> AnalysisInputs {
    let mut inputs = AnalysisInputs::new(student);
    inputs.time_range = Some(TimeRange::new(base_time(), base_time() + Duration::days(range_days)));
    for &(from, to) in clusters {
        for day in from..=to {
            inputs.emotions.push(emotion(student, day, "anxious"));
            inputs.sensory_inputs.push(sensory(student, day, "avoiding"));
        }
    }
    inputs
}

/// Completes immediately unless the student id asks it to hang or crash
#[derive(Default)]
pub struct ScriptedEngine {
    calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComputeEngine for ScriptedEngine {
    async fn compute(&self, task: &ComputeTask, progress: &ProgressReporter) -> Result<AnalysisReport, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let student = task.inputs().student_id.as_str();
        if student.starts_with(HANG_PREFIX) {
            return std::future::pending().await;
        }
        if student.starts_with(CRASH_PREFIX) {
            return Err("worker crashed while computing".to_string());
        }
        progress.progress("computing", 50);
        if student.starts_with(SLOW_PREFIX) {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        Ok(AnalysisReport {
            key_findings: vec![format!("{} records analysed", task.inputs().record_count())],
            insights: vec![format!("worker insights for {student}")],
            ..AnalysisReport::default()
        })
    }
}

/// Collects every notification that makes it past the rate limiter
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn count(&self, kind: NotificationKind) -> usize {
        self.seen.lock().iter().filter(|n| n.kind == kind).count()
    }

    pub fn total(&self) -> usize {
        self.seen.lock().len()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.seen.lock().push(notification.clone());
    }
}

/// Answers window prompts with a summary and the reduce prompt with a report
#[derive(Default)]
pub struct FakeRemoteClient {
    prompts: Mutex<Vec<Prompt>>,
    fail_everything: bool,
}

impl FakeRemoteClient {
    pub fn failing() -> Self {
        Self {
            fail_everything: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn window_calls(&self) -> usize {
        self.prompts
            .lock()
            .iter()
            .filter(|p| p.user.starts_with("Summarize this period"))
            .count()
    }

    pub fn reduce_calls(&self) -> usize {
        self.prompts
            .lock()
            .iter()
            .filter(|p| p.user.starts_with("You receive partial summaries"))
            .count()
    }
}

#[async_trait]
impl RemoteModelClient for FakeRemoteClient {
    fn model_name(&self) -> &str {
        "fake-model"
    }

    async fn chat_json(&self, prompt: &Prompt) -> Result<Value, RemoteCallError> {
        let call = {
            let mut prompts = self.prompts.lock();
            prompts.push(prompt.clone());
            prompts.len()
        };
        if self.fail_everything {
            return Err(RemoteCallError::Transport("service unavailable".to_string()));
        }
        if prompt.user.starts_with("Summarize this period") {
            return Ok(json!({
                "keyFindings": [format!("Window {call}: anxiety before transitions")],
                "patterns": [{"name": "Transition anxiety", "strength": 0.6, "impact": "medium"}]
            }));
        }
        Ok(json!({
            "summary": "Anxiety clusters around transitions.",
            "keyFindings": ["Anxiety recurs before transitions"],
            "patterns": [{"name": "Transition anxiety", "strength": 0.7}],
            "suggestedInterventions": [{"title": "Visual schedule"}]
        }))
    }
}

pub struct Harness {
    pub orchestrator: InsightsOrchestrator,
    pub provider: Arc<ConfigProvider>,
    pub engine: Arc<ScriptedEngine>,
    pub notifier: Arc<RecordingNotifier>,
    pub remote: Arc<FakeRemoteClient>,
}

pub fn harness(config: InsightsConfig) -> Harness {
    harness_with_remote(config, FakeRemoteClient::default())
}

pub fn harness_with_remote(config: InsightsConfig, remote: FakeRemoteClient) -> Harness {
    let provider = ConfigProvider::new(config).expect("valid test config");
    let engine = Arc::new(ScriptedEngine::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let remote = Arc::new(remote);
    let orchestrator = InsightsOrchestrator::builder(Arc::clone(&provider))
        .context_factory(Arc::new(TaskContextFactory::new(Arc::clone(&engine))))
        .notifier(notifier.clone())
        .remote_client(remote.clone())
        .build()
        .expect("orchestrator builds");
    Harness {
        orchestrator,
        provider,
        engine,
        notifier,
        remote,
    }
}
