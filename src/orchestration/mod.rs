//! # Orchestration
//!
//! [`InsightsOrchestrator`] ties together the result cache, the background
//! worker, the remote pipelines and the fallback engine behind one `submit`
//! call.
//!
//! ```rust
//! use insights_core::config::{ConfigProvider, InsightsConfig};
//! use insights_core::models::{AnalysisInputs, ReportOrigin, SubmitOptions};
//! use insights_core::orchestration::InsightsOrchestrator;
//!
//! # tokio_test::block_on(async {
//! let provider = ConfigProvider::new(InsightsConfig::default()).unwrap();
//! // No context factory: every request is served by the fallback engine
//! let orchestrator = InsightsOrchestrator::builder(provider).build().unwrap();
//!
//! let report = orchestrator
//!     .submit(AnalysisInputs::new("student-7"), SubmitOptions::default())
//!     .await
//!     .unwrap();
//! assert_eq!(report.origin, ReportOrigin::Fallback);
//! assert!(!report.caveats.is_empty());
//! # });
//! ```

pub mod orchestrator;
pub mod tags;

pub use orchestrator::{InsightsOrchestrator, InsightsOrchestratorBuilder, RequestPhase};
pub use tags::{derive_tags, month_tag, student_tag};
