//! # Background Worker
//!
//! One shared execution context, reference counted across consumers, with a
//! per-request watchdog and a circuit breaker in front of it.

pub mod context;
pub mod messages;
pub mod supervisor;
pub mod watchdog;

pub use context::{ComputeEngine, ContextFactory, ContextHandle, ProgressReporter, TaskContextFactory};
pub use messages::{ProgressEvent, WorkerCommand, WorkerMessage, WorkerRequest};
pub use supervisor::{
    DispatchOutcome, DispatchTicket, LifecycleState, SupervisorSettings, WorkerLease, WorkerSupervisor,
};
pub use watchdog::Watchdog;
