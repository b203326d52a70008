use std::path::{Path, PathBuf};

pub const ATELIER_DIR: &str = ".atelier";
pub const WORKSPACE_DIR: &str = "workspace";
pub const JOBS_DIR: &str = "jobs";

pub fn atelier_root(home: &Path) -> PathBuf {
    home.join(ATELIER_DIR)
}

/// Default executor workspace: `<home>/.atelier/workspace`.
pub fn default_workspace(home: &Path) -> PathBuf {
    atelier_root(home).join(WORKSPACE_DIR)
}

pub fn jobs_dir(workspace: &Path) -> PathBuf {
    workspace.join(JOBS_DIR)
}
