//! The knowledge base: catalog books and commissions plus change notification.
//!
//! Two adapters implement [`KnowledgeBase`]:
//! - [`memory::MemoryKnowledgeBase`]: everything in process memory
//! - [`fs::FsKnowledgeBase`]: YAML documents under `<home>/.atelier/`
//!
//! # Notification contract
//!
//! A sink registered through `observe_*` receives the id of every later
//! publish for the registration's lifetime, which ends when the receiving
//! half is dropped. Delivery is at-least-once with no ordering guarantee
//! across sinks. The payload is only an id: consumers must re-read the
//! current edition rather than assume which edition triggered the message.

pub mod fs;
pub mod memory;

use tokio::sync::mpsc;

use crate::catalog::CatalogBook;
use crate::error::KnowledgeBaseError;
use crate::formula::Commission;
use crate::types::{CatalogId, CommissionId};

/// Receives catalog ids on every catalog publish.
pub type CatalogSink = mpsc::UnboundedSender<CatalogId>;

/// Receives commission ids on every commission publish.
pub type CommissionSink = mpsc::UnboundedSender<CommissionId>;

/// Concurrency-safe store of catalog books and commissions.
pub trait KnowledgeBase: Send + Sync {
    /// Current edition of the catalog `id`, if any was ever published.
    fn catalog(&self, id: &CatalogId) -> Option<CatalogBook>;

    /// Snapshot of every known catalog id, in no particular order.
    fn list_catalogs(&self) -> Vec<CatalogId>;

    /// Register `sink` for every future catalog publish.
    fn observe_catalogs(&self, sink: CatalogSink);

    /// Store `book` as the current edition of `book.id` and notify sinks.
    fn publish_catalog(&self, book: CatalogBook) -> Result<(), KnowledgeBaseError>;

    /// Current definition of the commission `id`.
    fn commission(&self, id: &CommissionId) -> Option<Commission>;

    /// Snapshot of every known commission id, in no particular order.
    fn list_commissions(&self) -> Vec<CommissionId>;

    /// Register `sink` for every future commission publish.
    fn observe_commissions(&self, sink: CommissionSink);

    /// Store `commission`, replacing any previous definition, and notify sinks.
    fn publish_commission(&self, commission: Commission) -> Result<(), KnowledgeBaseError>;

    /// Every commission with an input named exactly by one of `ids`.
    fn select_commissions_by_input_catalog(&self, ids: &[CatalogId]) -> Vec<Commission>;
}
