//! In-memory knowledge base.
//!
//! All reads and writes go through one `parking_lot::Mutex`. Publishes store
//! the new edition and fan the id out while still holding the lock, so a
//! subscriber that reacts to a notification always finds at least that edition.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::catalog::CatalogBook;
use crate::error::KnowledgeBaseError;
use crate::formula::Commission;
use crate::kb::{CatalogSink, CommissionSink, KnowledgeBase};
use crate::types::{CatalogId, CommissionId};

#[derive(Debug, Default)]
struct State {
    catalogs: BTreeMap<CatalogId, CatalogBook>,
    commissions: BTreeMap<CommissionId, Commission>,
    catalog_sinks: Vec<CatalogSink>,
    commission_sinks: Vec<CommissionSink>,
}

/// Knowledge base held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryKnowledgeBase {
    state: Mutex<State>,
}

impl MemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed catalogs and commissions without notifying anyone.
    ///
    /// Used by the persistent adapter to restore state on open.
    pub fn restore(
        catalogs: impl IntoIterator<Item = CatalogBook>,
        commissions: impl IntoIterator<Item = Commission>,
    ) -> Self {
        let state = State {
            catalogs: catalogs.into_iter().map(|b| (b.id.clone(), b)).collect(),
            commissions: commissions.into_iter().map(|c| (c.id.clone(), c)).collect(),
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Number of live catalog sinks. Dropped sinks are only pruned on publish.
    pub fn catalog_sink_count(&self) -> usize {
        self.state.lock().catalog_sinks.len()
    }
}

impl KnowledgeBase for MemoryKnowledgeBase {
    fn catalog(&self, id: &CatalogId) -> Option<CatalogBook> {
        self.state.lock().catalogs.get(id).cloned()
    }

    fn list_catalogs(&self) -> Vec<CatalogId> {
        self.state.lock().catalogs.keys().cloned().collect()
    }

    fn observe_catalogs(&self, sink: CatalogSink) {
        self.state.lock().catalog_sinks.push(sink);
    }

    fn publish_catalog(&self, book: CatalogBook) -> Result<(), KnowledgeBaseError> {
        let mut state = self.state.lock();
        let id = book.id.clone();
        state.catalogs.insert(id.clone(), book);
        state.catalog_sinks.retain(|sink| sink.send(id.clone()).is_ok());
        tracing::debug!(catalog = %id, sinks = state.catalog_sinks.len(), "catalog published");
        Ok(())
    }

    fn commission(&self, id: &CommissionId) -> Option<Commission> {
        self.state.lock().commissions.get(id).cloned()
    }

    fn list_commissions(&self) -> Vec<CommissionId> {
        self.state.lock().commissions.keys().cloned().collect()
    }

    fn observe_commissions(&self, sink: CommissionSink) {
        self.state.lock().commission_sinks.push(sink);
    }

    fn publish_commission(&self, commission: Commission) -> Result<(), KnowledgeBaseError> {
        let mut state = self.state.lock();
        let id = commission.id.clone();
        state.commissions.insert(id.clone(), commission);
        state.commission_sinks.retain(|sink| sink.send(id.clone()).is_ok());
        tracing::debug!(commission = %id, "commission published");
        Ok(())
    }

    fn select_commissions_by_input_catalog(&self, ids: &[CatalogId]) -> Vec<Commission> {
        let state = self.state.lock();
        state
            .commissions
            .values()
            .filter(|commission| ids.iter().any(|id| commission.depends_on(id)))
            .cloned()
            .collect()
    }
}
