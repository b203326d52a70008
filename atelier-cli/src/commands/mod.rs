pub mod catalog;
pub mod commission;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};

use atelier_core::FsKnowledgeBase;

pub(crate) fn open_kb(home: &Path) -> Result<FsKnowledgeBase> {
    FsKnowledgeBase::open_at(home)
        .with_context(|| format!("failed to open knowledge base under {}", home.display()))
}
