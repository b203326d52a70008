//! Atelier core library: catalog books, formulas, commissions, and the
//! knowledge base that stores them.
//!
//! - [`types`]: identifier newtypes and [`Sku`]
//! - [`catalog`]: copy-on-write [`CatalogBook`]
//! - [`formula`]: [`Formula`] templates and [`Commission`]s
//! - [`kb`]: the [`KnowledgeBase`] trait with memory and YAML adapters
//! - [`error`]: [`KnowledgeBaseError`]

pub mod catalog;
pub mod error;
pub mod formula;
pub mod kb;
pub mod types;

pub use catalog::CatalogBook;
pub use error::KnowledgeBaseError;
pub use formula::{Action, Commission, Formula, Input, Output};
pub use kb::{fs::FsKnowledgeBase, memory::MemoryKnowledgeBase, KnowledgeBase};
pub use types::{CatalogId, CommissionId, Sku, TrackName};
