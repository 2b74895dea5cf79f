#![allow(clippy::doc_markdown)] // Allow technical terms like LRU, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Insights Core Rust
//!
//! Resilient compute orchestration for student analytics.
//!
//! ## Overview
//!
//! A caller submits a dataset (tracking sessions, emotion and sensory
//! observations, goals) and always gets an [`AnalysisReport`] back. Behind that
//! one call:
//!
//! - **Result cache**: deterministic fingerprints, TTL, LRU eviction and tag
//!   invalidation ([`cache`], [`fingerprint`])
//! - **Background worker**: a single reference-counted execution context with
//!   a readiness queue, a per-request watchdog and a circuit breaker
//!   ([`worker`], [`resilience`])
//! - **Remote analysis**: single-pass or map-reduce over time windows, with
//!   validate-or-repair of model output ([`pipeline`], [`remote`],
//!   [`validation`])
//! - **Fallback**: an in-process heuristic engine that never fails
//!   ([`fallback`])
//!
//! Only invalid input is returned as an error. Everything else degrades into a
//! report with human-readable caveats.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - The `InsightsOrchestrator` facade
//! - [`config`] - Layered configuration and the hot-swappable `ConfigProvider`
//! - [`models`] - Records, tasks and the normalized report
//! - [`analysis`] - Confidence scoring and data lineage
//! - [`error`] - Structured error handling
//! - [`logging`] - Tracing setup and domain log macros
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use insights_core::config::{ConfigProvider, InsightsConfig};
//! use insights_core::models::{AnalysisInputs, SubmitOptions};
//! use insights_core::orchestration::InsightsOrchestrator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = ConfigProvider::new(InsightsConfig::default())?;
//! let orchestrator = InsightsOrchestrator::builder(provider).build()?;
//!
//! let report = orchestrator
//!     .submit(AnalysisInputs::new("student-42"), SubmitOptions::default())
//!     .await?;
//! println!("{} insights, confidence {:.2}", report.insights.len(), report.confidence.overall);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod analysis;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod fallback;
pub mod fingerprint;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod pipeline;
pub mod remote;
pub mod resilience;
pub mod validation;
pub mod worker;

pub use cache::{CacheStats, ResultCache};
pub use config::{load_config, ConfigProvider, ConfigurationError, InsightsConfig};
pub use error::{InsightsError, InsightsResult};
pub use fallback::{FallbackEngine, FallbackReason, HeuristicFallbackEngine};
pub use fingerprint::FingerprintBuilder;
pub use models::{AnalysisInputs, AnalysisReport, SubmitOptions};
pub use orchestration::{InsightsOrchestrator, InsightsOrchestratorBuilder};
pub use remote::{Prompt, RemoteCallError, RemoteModelClient};
pub use validation::{ReportValidator, SchemaRepairValidator, ValidationOutcome};
pub use worker::{ComputeEngine, ContextFactory, TaskContextFactory, WorkerSupervisor};
