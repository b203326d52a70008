//! Filesystem watch on a knowledge base home: documents written by another
//! handle or process are adopted and re-announced to this handle's observers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use atelier_core::kb::fs::{catalogs_dir_at, commissions_dir_at, is_document};
use atelier_core::FsKnowledgeBase;

use crate::error::ForemanError;

/// Live watch on `catalogs/` and `commissions/`. Dropping it stops the watch.
pub struct StoreWatch {
    kb: Arc<FsKnowledgeBase>,
    catalogs: PathBuf,
    commissions: PathBuf,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
}

impl StoreWatch {
    /// Register the watch, then adopt anything written since `kb` was opened.
    pub fn start(kb: Arc<FsKnowledgeBase>) -> Result<Self, ForemanError> {
        // FSEvents reports real paths (/private/var/... on macOS).
        let catalogs = canonical(catalogs_dir_at(kb.home()));
        let commissions = canonical(commissions_dir_at(kb.home()));

        let (event_tx, events) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;
        watcher.watch(&catalogs, RecursiveMode::NonRecursive)?;
        watcher.watch(&commissions, RecursiveMode::NonRecursive)?;

        let adopted = kb.refresh()?;
        tracing::debug!(
            catalogs = %catalogs.display(),
            commissions = %commissions.display(),
            adopted,
            "watching knowledge base",
        );

        Ok(Self {
            kb,
            catalogs,
            commissions,
            events,
            _watcher: watcher,
        })
    }

    /// Apply change events until `shutdown` fires or the watcher stops.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ForemanError> {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    let event = match event {
                        Ok(event) => event,
                        Err(err) => {
                            tracing::warn!(error = %err, "watcher event error");
                            continue;
                        }
                    };
                    if !is_relevant_event_kind(&event.kind) {
                        continue;
                    }
                    for path in &event.paths {
                        self.apply(path);
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&self, path: &Path) {
        if !is_document(path) {
            return;
        }
        let reloaded = match path.parent() {
            Some(dir) if dir == self.catalogs => self
                .kb
                .reload_catalog(path)
                .map(|id| id.map(|id| id.to_string())),
            Some(dir) if dir == self.commissions => self
                .kb
                .reload_commission(path)
                .map(|id| id.map(|id| id.to_string())),
            _ => return,
        };
        match reloaded {
            Ok(Some(id)) => tracing::info!(id = %id, path = %path.display(), "adopted external write"),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "failed to reload document")
            }
        }
    }
}

fn canonical(dir: PathBuf) -> PathBuf {
    fs::canonicalize(&dir).unwrap_or(dir)
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}
