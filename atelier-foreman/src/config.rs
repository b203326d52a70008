//! Foreman configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::executor::{DryRunExecutor, Executor, ProcessExecutor};
use crate::paths::default_workspace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForemanConfig {
    /// Directory holding `.atelier/`.
    pub home: PathBuf,
    /// Root for per-job directories of the process executor.
    pub workspace: PathBuf,
    /// Report deterministic hashes instead of running anything.
    pub dry_run: bool,
}

impl ForemanConfig {
    /// Defaults rooted at `home`: workspace under `.atelier/workspace`, real execution.
    pub fn at(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            workspace: default_workspace(home),
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The executor this configuration selects.
    pub fn executor(&self) -> Arc<dyn Executor> {
        if self.dry_run {
            Arc::new(DryRunExecutor)
        } else {
            Arc::new(ProcessExecutor::new(self.workspace.clone()))
        }
    }
}
