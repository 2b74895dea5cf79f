//! # Execution Contexts
//!
//! An execution context is an independently scheduled task that receives
//! [`WorkerCommand`]s and answers with [`WorkerMessage`]s. [`ContextFactory`]
//! is the seam the supervisor creates contexts through; the default
//! [`TaskContextFactory`] runs a [`ComputeEngine`] on its own tokio task.

use super::messages::{WorkerCommand, WorkerMessage};
use crate::constants::READY_STAGE;
use crate::error::{InsightsError, InsightsResult};
use crate::models::{AnalysisReport, ComputeTask, ReportOrigin};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

/// Handle to a running context, owned by the supervisor
#[derive(Debug)]
pub struct ContextHandle {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    messages: Option<mpsc::UnboundedReceiver<WorkerMessage>>,
    abort: Option<AbortHandle>,
}

impl ContextHandle {
    pub fn new(
        commands: mpsc::UnboundedSender<WorkerCommand>,
        messages: mpsc::UnboundedReceiver<WorkerMessage>,
        abort: Option<AbortHandle>,
    ) -> Self {
        Self {
            commands,
            messages: Some(messages),
            abort,
        }
    }

    pub fn send(&self, command: WorkerCommand) -> InsightsResult<()> {
        self.commands.send(command).map_err(|_| {
            InsightsError::BackgroundUnitUnavailable("execution context has stopped".to_string())
        })
    }

    /// Hand the inbound stream to the router; only the first call returns it
    pub(crate) fn take_messages(&mut self) -> Option<mpsc::UnboundedReceiver<WorkerMessage>> {
        self.messages.take()
    }

    /// Stop the context immediately, without draining
    pub fn terminate(&self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }
}

/// Creates execution contexts
pub trait ContextFactory: Send + Sync {
    /// Start a new context. A failure here trips the circuit as an init failure.
    fn spawn(&self) -> InsightsResult<ContextHandle>;
}

/// Lets an engine report progress while it computes
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    events: mpsc::UnboundedSender<WorkerMessage>,
    cache_key: String,
    request_id: Uuid,
}

impl ProgressReporter {
    pub fn progress(&self, stage: impl Into<String>, percent: u8) {
        let _ = self.events.send(WorkerMessage::Progress {
            cache_key: Some(self.cache_key.clone()),
            request_id: Some(self.request_id),
            stage: stage.into(),
            percent: percent.min(100),
        });
    }

    pub fn partial(&self, payload: AnalysisReport) {
        let _ = self.events.send(WorkerMessage::Partial {
            cache_key: self.cache_key.clone(),
            request_id: self.request_id,
            payload,
        });
    }
}

/// The computation that runs inside a context
#[async_trait]
pub trait ComputeEngine: Send + Sync + 'static {
    /// Compute a report; an `Err` is reported to the supervisor as a runtime
    /// error and takes the context down.
    async fn compute(&self, task: &ComputeTask, progress: &ProgressReporter) -> Result<AnalysisReport, String>;
}

/// Runs a [`ComputeEngine`] on a dedicated tokio task per context
pub struct TaskContextFactory<E> {
    engine: Arc<E>,
}

impl<E: ComputeEngine> TaskContextFactory<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }
}

impl<E: ComputeEngine> ContextFactory for TaskContextFactory<E> {
    fn spawn(&self) -> InsightsResult<ContextHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            InsightsError::BackgroundUnitUnavailable(format!("no async runtime available: {e}"))
        })?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let join = runtime.spawn(run_context(Arc::clone(&self.engine), command_rx, event_tx));
        Ok(ContextHandle::new(command_tx, event_rx, Some(join.abort_handle())))
    }
}

async fn run_context<E: ComputeEngine>(
    engine: Arc<E>,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerMessage>,
) {
    // First message doubles as the readiness signal
    let _ = events.send(WorkerMessage::Progress {
        cache_key: None,
        request_id: None,
        stage: READY_STAGE.to_string(),
        percent: 0,
    });

    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Shutdown => break,
            WorkerCommand::Compute(request) => {
                let cache_key = request.task.cache_key().to_string();
                let reporter = ProgressReporter {
                    events: events.clone(),
                    cache_key: cache_key.clone(),
                    request_id: request.request_id,
                };
                let message = match engine.compute(&request.task, &reporter).await {
                    Ok(mut report) => {
                        report.origin = ReportOrigin::Worker;
                        report.cache_key = Some(cache_key.clone());
                        WorkerMessage::Complete {
                            cache_key,
                            request_id: request.request_id,
                            report,
                        }
                    }
                    Err(message) => WorkerMessage::Error {
                        cache_key: Some(cache_key),
                        request_id: Some(request.request_id),
                        message,
                    },
                };
                if events.send(message).is_err() {
                    break;
                }
            }
        }
    }
    debug!("Execution context stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisInputs;
    use crate::worker::messages::WorkerRequest;
    use std::collections::BTreeSet;
    use std::time::Duration;

    struct EchoEngine;

    #[async_trait]
    impl ComputeEngine for EchoEngine {
        async fn compute(&self, task: &ComputeTask, progress: &ProgressReporter) -> Result<AnalysisReport, String> {
            progress.progress("computing", 50);
            if task.inputs().student_id == "explode" {
                return Err("engine exploded".to_string());
            }
            Ok(AnalysisReport {
                insights: vec![format!("hello {}", task.inputs().student_id)],
                ..AnalysisReport::default()
            })
        }
    }

    fn request(student: &str) -> WorkerRequest {
        WorkerRequest {
            request_id: Uuid::new_v4(),
            task: Arc::new(ComputeTask::new(
                AnalysisInputs::new(student),
                format!("key-{student}"),
                Duration::from_secs(60),
                BTreeSet::new(),
                false,
            )),
        }
    }

    #[tokio::test]
    async fn test_context_signals_ready_then_completes() {
        let factory = TaskContextFactory::new(Arc::new(EchoEngine));
        let mut handle = factory.spawn().unwrap();
        let mut messages = handle.take_messages().unwrap();

        match messages.recv().await.unwrap() {
            WorkerMessage::Progress { stage, cache_key, .. } => {
                assert_eq!(stage, READY_STAGE);
                assert!(cache_key.is_none());
            }
            other => panic!("expected ready progress, got {other:?}"),
        }

        let req = request("s1");
        let id = req.request_id;
        handle.send(WorkerCommand::Compute(req)).unwrap();

        assert_eq!(messages.recv().await.unwrap().kind(), "progress");
        match messages.recv().await.unwrap() {
            WorkerMessage::Complete { request_id, report, cache_key } => {
                assert_eq!(request_id, id);
                assert_eq!(cache_key, "key-s1");
                assert_eq!(report.origin, ReportOrigin::Worker);
                assert_eq!(report.insights, vec!["hello s1"]);
            }
            other => panic!("expected complete, got {other:?}"),
        }
        handle.terminate();
    }

    #[tokio::test]
    async fn test_engine_error_becomes_error_message() {
        let factory = TaskContextFactory::new(Arc::new(EchoEngine));
        let mut handle = factory.spawn().unwrap();
        let mut messages = handle.take_messages().unwrap();
        messages.recv().await.unwrap();

        handle.send(WorkerCommand::Compute(request("explode"))).unwrap();
        messages.recv().await.unwrap();
        match messages.recv().await.unwrap() {
            WorkerMessage::Error { message, .. } => assert_eq!(message, "engine exploded"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let factory = TaskContextFactory::new(Arc::new(EchoEngine));
        assert!(matches!(
            factory.spawn(),
            Err(InsightsError::BackgroundUnitUnavailable(_))
        ));
    }
}
