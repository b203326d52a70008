//! Atelier foreman: plans executions from catalog changes, runs them, and
//! releases their outputs back into the knowledge base.
//!
//! - [`queue`]: [`PlanQueue`] with per-commission replacement and leases
//! - [`foreman`]: [`Foreman`] register / pump / evoke, plus [`fill`]
//! - [`releaser`]: completed formula → next catalog editions
//! - [`executor`]: dry-run and local-process executors
//! - [`runtime`]: the long-running loop and its blocking entry points
//! - [`watch`]: adopts knowledge base documents written by other processes

pub mod config;
mod error;
pub mod executor;
pub mod foreman;
pub mod paths;
pub mod queue;
pub mod releaser;
pub mod runtime;
pub mod watch;

pub use config::ForemanConfig;
pub use error::{ExecutorError, ForemanError};
pub use executor::{DryRunExecutor, Executor, Job, JobId, ProcessExecutor, RunRecord};
pub use foreman::{fill, DrainSummary, EvokeOutcome, Foreman, Notice};
pub use queue::{Lease, LeaseToken, Plan, PlanId, PlanQueue};
pub use runtime::{drain_blocking, init_tracing, open_foreman, run, start_blocking};
pub use watch::StoreWatch;
