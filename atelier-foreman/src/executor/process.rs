//! Executor that runs `action.exec` as a local process.
//!
//! # Job layout
//!
//! ```text
//! <workspace>/jobs/<job id>/
//!   stdout.log
//!   stderr.log
//!   <output paths...>      (collected and hashed after exit)
//! ```
//!
//! Bound inputs are exposed as `ATELIER_INPUT_<NAME>=<type>:<hash>`; nothing
//! is materialised. After a zero exit every declared output path is hashed
//! (a file directly, a directory by walking it in sorted order) and reported
//! as `sha256:<hex>` with the output's packing type.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use atelier_core::{Formula, Output, Sku};

use crate::error::{exec_io_err, ExecutorError};
use crate::executor::{Executor, Job, JobId, RunRecord};
use crate::paths::jobs_dir;

#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    workspace: PathBuf,
}

impl ProcessExecutor {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    /// `<workspace>/jobs/<job id>/`
    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        jobs_dir(&self.workspace).join(&job_id.0)
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn start(
        &self,
        formula: &Formula,
        job_id: &JobId,
    ) -> Result<Box<dyn Job>, ExecutorError> {
        let Some((program, args)) = formula.action.exec.split_first() else {
            return Err(ExecutorError::EmptyAction);
        };

        let job_dir = self.job_dir(job_id);
        fs::create_dir_all(&job_dir).map_err(|e| exec_io_err(&job_dir, e))?;
        let stdout_path = job_dir.join("stdout.log");
        let stderr_path = job_dir.join("stderr.log");
        let stdout = fs::File::create(&stdout_path).map_err(|e| exec_io_err(&stdout_path, e))?;
        let stderr = fs::File::create(&stderr_path).map_err(|e| exec_io_err(&stderr_path, e))?;

        let cwd = match formula.action.cwd.as_deref() {
            Some(cwd) => within(&job_dir, cwd),
            None => job_dir.clone(),
        };
        fs::create_dir_all(&cwd).map_err(|e| exec_io_err(&cwd, e))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&cwd)
            .envs(&formula.action.env)
            .env("ATELIER_JOB_ID", &job_id.0)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        for (catalog, input) in &formula.inputs {
            if let Some(sku) = &input.sku {
                command.env(input_env_var(catalog.as_str()), sku.to_string());
            }
        }

        let mut child = command.spawn().map_err(|source| ExecutorError::Spawn {
            program: program.clone(),
            source,
        })?;
        tracing::info!(job = %job_id, program = %program, dir = %job_dir.display(), "process started");

        let outputs = formula.outputs.clone();
        let id = job_id.clone();
        let handle = tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(status) => status,
                Err(err) => return RunRecord::failed(id, -1, format!("wait failed: {err}")),
            };
            let exit_code = status.code().unwrap_or(-1);
            if !status.success() {
                return RunRecord::failed(id, exit_code, format!("process exited with {status}"));
            }

            let collected =
                tokio::task::spawn_blocking(move || collect_outputs(&job_dir, &outputs)).await;
            match collected {
                Ok(Ok(outputs)) => RunRecord::succeeded(id, outputs),
                Ok(Err(err)) => RunRecord::failed(id, exit_code, err),
                Err(err) => RunRecord::failed(id, exit_code, format!("output collection panicked: {err}")),
            }
        });

        Ok(Box::new(ProcessJob {
            id: job_id.clone(),
            handle: Some(handle),
        }))
    }
}

/// Aborting the task drops the child, which kills it.
struct ProcessJob {
    id: JobId,
    handle: Option<JoinHandle<RunRecord>>,
}

impl Drop for ProcessJob {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Job for ProcessJob {
    fn id(&self) -> &JobId {
        &self.id
    }

    async fn wait(mut self: Box<Self>) -> RunRecord {
        let Some(handle) = self.handle.take() else {
            return RunRecord::failed(self.id.clone(), -1, "job already awaited");
        };
        match handle.await {
            Ok(record) => record,
            Err(err) => RunRecord::failed(self.id.clone(), -1, format!("job task join failure: {err}")),
        }
    }
}

/// `ATELIER_INPUT_<NAME>` with the catalog id upper-cased and every
/// non-alphanumeric byte replaced by `_`.
pub fn input_env_var(catalog: &str) -> String {
    let name: String = catalog
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("ATELIER_INPUT_{name}")
}

/// Resolve a formula path (absolute or relative) inside `root`.
fn within(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}

fn collect_outputs(
    job_dir: &Path,
    outputs: &BTreeMap<String, Output>,
) -> Result<BTreeMap<String, Sku>, String> {
    let mut collected = BTreeMap::new();
    for (slot, output) in outputs {
        let path = within(job_dir, &output.path);
        let hash = hash_path(&path)
            .map_err(|err| format!("output '{slot}' at {}: {err}", path.display()))?;
        collected.insert(slot.clone(), Sku::new(output.packing.clone(), hash));
    }
    Ok(collected)
}

/// `sha256:<hex>` over a file's bytes, or over a directory's relative paths
/// and file contents in file-name order. Symlinks inside a directory are not
/// followed and do not contribute.
pub fn hash_path(path: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let meta = fs::metadata(path)?;
    if meta.is_file() {
        hasher.update(fs::read(path)?);
    } else {
        for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            hasher.update(fs::read(entry.path())?);
            hasher.update([0u8]);
        }
    }
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}
