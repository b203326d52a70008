//! Execution collaborators.
//!
//! The foreman hands a bound [`Formula`] to an [`Executor`], gets a [`Job`]
//! back immediately and later waits on it for a [`RunRecord`]. A record with
//! an `error` means "no release".

pub mod dry_run;
pub mod process;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use atelier_core::{Formula, Sku};

use crate::error::ExecutorError;

pub use dry_run::DryRunExecutor;
pub use process::ProcessExecutor;

/// Identifier of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Result of one finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub job_id: JobId,
    /// Output slot name → reported SKU.
    pub outputs: BTreeMap<String, Sku>,
    pub exit_code: i32,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn succeeded(job_id: JobId, outputs: BTreeMap<String, Sku>) -> Self {
        Self {
            job_id,
            outputs,
            exit_code: 0,
            error: None,
        }
    }

    pub fn failed(job_id: JobId, exit_code: i32, error: impl Into<String>) -> Self {
        Self {
            job_id,
            outputs: BTreeMap::new(),
            exit_code,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Starts executions of bound formulas.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Begin executing `formula`. Returns as soon as the job is running.
    async fn start(&self, formula: &Formula, job_id: &JobId)
        -> Result<Box<dyn Job>, ExecutorError>;
}

/// A running execution.
#[async_trait]
pub trait Job: Send {
    fn id(&self) -> &JobId;

    /// Block until the execution finishes.
    async fn wait(self: Box<Self>) -> RunRecord;
}

/// A job whose record is already known.
#[derive(Debug)]
pub struct CompletedJob {
    record: RunRecord,
}

impl CompletedJob {
    pub fn new(record: RunRecord) -> Self {
        Self { record }
    }
}

#[async_trait]
impl Job for CompletedJob {
    fn id(&self) -> &JobId {
        &self.record.job_id
    }

    async fn wait(self: Box<Self>) -> RunRecord {
        self.record
    }
}
