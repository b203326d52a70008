//! Persistent knowledge base backed by YAML documents.
//!
//! # Storage layout
//!
//! ```text
//! ~/.atelier/
//!   catalogs/
//!     <encoded catalog id>.yaml      (one book per file, mode 0600)
//!   commissions/
//!     <encoded commission id>.yaml   (one commission per file, mode 0600)
//! ```
//!
//! Ids are percent-encoded outside the URL unreserved set, so `build-b::x`
//! lands in `build-b%3A%3Ax.yaml`. The id itself is stored inside the document.
//!
//! # API pattern
//!
//! - `open_at(home)`: explicit home; used in tests with `TempDir`
//! - `open()`: derives home from `dirs::home_dir()`, delegates to `open_at`
//! - `reload_catalog` / `reload_commission` / `refresh`: adopt documents that
//!   another handle on the same home wrote, notifying observers
//!
//! # Several handles on one home
//!
//! Each handle serves reads from its own memory. A catalog publish re-reads
//! the stored document under the writer lock and replays its new releases on
//! top of it, so releases written by another handle are never dropped.
//! Handles in separate processes can still interleave between that re-read
//! and the rename.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogBook;
use crate::error::{io_err, KnowledgeBaseError};
use crate::formula::Commission;
use crate::kb::memory::MemoryKnowledgeBase;
use crate::kb::{CatalogSink, CommissionSink, KnowledgeBase};
use crate::types::{CatalogId, CommissionId};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.atelier/`
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".atelier")
}

/// `<home>/.atelier/catalogs/`
pub fn catalogs_dir_at(home: &Path) -> PathBuf {
    root_at(home).join("catalogs")
}

/// `<home>/.atelier/commissions/`
pub fn commissions_dir_at(home: &Path) -> PathBuf {
    root_at(home).join("commissions")
}

/// `<home>/.atelier/catalogs/<encoded id>.yaml`: pure, no I/O.
pub fn catalog_path_at(home: &Path, id: &CatalogId) -> PathBuf {
    catalogs_dir_at(home).join(format!("{}.yaml", encode_id(id.as_str())))
}

/// `<home>/.atelier/commissions/<encoded id>.yaml`: pure, no I/O.
pub fn commission_path_at(home: &Path, id: &CommissionId) -> PathBuf {
    commissions_dir_at(home).join(format!("{}.yaml", encode_id(id.as_str())))
}

/// File stem for an id: percent-encoded, so path separators never survive.
pub fn encode_id(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

// ---------------------------------------------------------------------------
// 2. Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct CatalogDocument {
    updated_at: DateTime<Utc>,
    book: CatalogBook,
}

#[derive(Debug, Serialize, Deserialize)]
struct CommissionDocument {
    updated_at: DateTime<Utc>,
    commission: Commission,
}

// ---------------------------------------------------------------------------
// 3. Adapter
// ---------------------------------------------------------------------------

/// Knowledge base persisted under `<home>/.atelier/`.
///
/// Reads are served from memory. Publishes write the document to disk first,
/// then update memory and notify, all under one writer lock so disk and
/// memory agree on the order of editions.
#[derive(Debug)]
pub struct FsKnowledgeBase {
    home: PathBuf,
    inner: MemoryKnowledgeBase,
    writer: Mutex<()>,
}

impl FsKnowledgeBase {
    /// Open (or create) the knowledge base rooted at `home`.
    ///
    /// Returns `KnowledgeBaseError::Parse` (with path + line context) if any
    /// stored document is malformed.
    pub fn open_at(home: &Path) -> Result<Self, KnowledgeBaseError> {
        ensure_dir(&catalogs_dir_at(home))?;
        ensure_dir(&commissions_dir_at(home))?;

        let catalogs: Vec<CatalogDocument> = load_documents(&catalogs_dir_at(home))?;
        let commissions: Vec<CommissionDocument> = load_documents(&commissions_dir_at(home))?;
        tracing::debug!(
            home = %home.display(),
            catalogs = catalogs.len(),
            commissions = commissions.len(),
            "knowledge base opened",
        );

        Ok(Self {
            home: home.to_path_buf(),
            inner: MemoryKnowledgeBase::restore(
                catalogs.into_iter().map(|doc| doc.book),
                commissions.into_iter().map(|doc| doc.commission),
            ),
            writer: Mutex::new(()),
        })
    }

    /// `open_at` convenience wrapper.
    pub fn open() -> Result<Self, KnowledgeBaseError> {
        Self::open_at(&home()?)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Adopt the catalog document at `path` if it differs from memory.
    ///
    /// Returns the id when observers were notified; `None` when the file is
    /// gone or already matches.
    pub fn reload_catalog(&self, path: &Path) -> Result<Option<CatalogId>, KnowledgeBaseError> {
        let _guard = self.writer.lock();
        let Some(doc) = read_document::<CatalogDocument>(path)? else {
            return Ok(None);
        };
        if self.inner.catalog(&doc.book.id).as_ref() == Some(&doc.book) {
            return Ok(None);
        }
        let id = doc.book.id.clone();
        tracing::debug!(catalog = %id, path = %path.display(), "catalog changed on disk");
        self.inner.publish_catalog(doc.book)?;
        Ok(Some(id))
    }

    /// Adopt the commission document at `path` if it differs from memory.
    pub fn reload_commission(
        &self,
        path: &Path,
    ) -> Result<Option<CommissionId>, KnowledgeBaseError> {
        let _guard = self.writer.lock();
        let Some(doc) = read_document::<CommissionDocument>(path)? else {
            return Ok(None);
        };
        if self.inner.commission(&doc.commission.id).as_ref() == Some(&doc.commission) {
            return Ok(None);
        }
        let id = doc.commission.id.clone();
        tracing::debug!(commission = %id, path = %path.display(), "commission changed on disk");
        self.inner.publish_commission(doc.commission)?;
        Ok(Some(id))
    }

    /// Rescan both directories and adopt every document that changed.
    /// Returns how many ids were re-announced.
    pub fn refresh(&self) -> Result<usize, KnowledgeBaseError> {
        let mut changed = 0;
        for path in yaml_files(&catalogs_dir_at(&self.home))? {
            changed += usize::from(self.reload_catalog(&path)?.is_some());
        }
        for path in yaml_files(&commissions_dir_at(&self.home))? {
            changed += usize::from(self.reload_commission(&path)?.is_some());
        }
        Ok(changed)
    }
}

impl KnowledgeBase for FsKnowledgeBase {
    fn catalog(&self, id: &CatalogId) -> Option<CatalogBook> {
        self.inner.catalog(id)
    }

    fn list_catalogs(&self) -> Vec<CatalogId> {
        self.inner.list_catalogs()
    }

    fn observe_catalogs(&self, sink: CatalogSink) {
        self.inner.observe_catalogs(sink)
    }

    fn publish_catalog(&self, book: CatalogBook) -> Result<(), KnowledgeBaseError> {
        let _guard = self.writer.lock();
        let path = catalog_path_at(&self.home, &book.id);
        let current = self.inner.catalog(&book.id);
        let book = match read_document::<CatalogDocument>(&path)? {
            Some(stored) if current.as_ref() != Some(&stored.book) => {
                tracing::debug!(catalog = %book.id, "stored catalog moved on; rebasing release");
                let base = current.unwrap_or_else(|| CatalogBook::new(book.id.clone()));
                book.rebase(&base, &stored.book)
            }
            _ => book,
        };
        let doc = CatalogDocument {
            updated_at: Utc::now(),
            book,
        };
        save_document(&path, &doc)?;
        self.inner.publish_catalog(doc.book)
    }

    fn commission(&self, id: &CommissionId) -> Option<Commission> {
        self.inner.commission(id)
    }

    fn list_commissions(&self) -> Vec<CommissionId> {
        self.inner.list_commissions()
    }

    fn observe_commissions(&self, sink: CommissionSink) {
        self.inner.observe_commissions(sink)
    }

    fn publish_commission(&self, commission: Commission) -> Result<(), KnowledgeBaseError> {
        let _guard = self.writer.lock();
        let path = commission_path_at(&self.home, &commission.id);
        let doc = CommissionDocument {
            updated_at: Utc::now(),
            commission,
        };
        save_document(&path, &doc)?;
        self.inner.publish_commission(doc.commission)
    }

    fn select_commissions_by_input_catalog(&self, ids: &[CatalogId]) -> Vec<Commission> {
        self.inner.select_commissions_by_input_catalog(ids)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, KnowledgeBaseError> {
    dirs::home_dir().ok_or(KnowledgeBaseError::HomeNotFound)
}

fn ensure_dir(dir: &Path) -> Result<(), KnowledgeBaseError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        set_dir_permissions(dir)?;
    }
    Ok(())
}

/// Every `*.yaml` file in `dir`, sorted by file name.
fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, KnowledgeBaseError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|path| is_document(path))
        .collect();
    paths.sort();
    Ok(paths)
}

/// `true` for a stored document; `.yaml.tmp` staging files do not count.
pub fn is_document(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("yaml")
}

/// Load every document in `dir`, sorted by file name.
fn load_documents<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, KnowledgeBaseError> {
    let mut docs = Vec::new();
    for path in yaml_files(dir)? {
        if let Some(doc) = read_document(&path)? {
            docs.push(doc);
        }
    }
    Ok(docs)
}

/// Parse the document at `path`; `None` if it does not exist.
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, KnowledgeBaseError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| KnowledgeBaseError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
fn save_document<T: Serialize>(path: &Path, doc: &T) -> Result<(), KnowledgeBaseError> {
    let yaml = serde_yaml::to_string(doc)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), KnowledgeBaseError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), KnowledgeBaseError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), KnowledgeBaseError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), KnowledgeBaseError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sku;
    use tempfile::TempDir;

    #[test]
    fn encode_id_escapes_separators() {
        assert_eq!(encode_id("apollo"), "apollo");
        assert_eq!(encode_id("B::x"), "B%3A%3Ax");
        assert_eq!(encode_id("a/b"), "a%2Fb");
        assert_eq!(encode_id("build-b.tar_1"), "build-b.tar_1");
    }

    #[test]
    fn staging_files_are_not_documents() {
        assert!(is_document(Path::new("/kb/catalogs/B%3A%3Ax.yaml")));
        assert!(!is_document(Path::new("/kb/catalogs/B%3A%3Ax.yaml.tmp")));
        assert!(!is_document(Path::new("/kb/catalogs/notes.txt")));
    }

    #[test]
    fn reload_of_missing_document_is_a_no_op() {
        let home = TempDir::new().expect("tempdir");
        let kb = FsKnowledgeBase::open_at(home.path()).expect("open");
        let path = catalog_path_at(home.path(), &CatalogId::from("absent"));
        assert_eq!(kb.reload_catalog(&path).expect("reload"), None);
    }

    #[test]
    fn catalog_path_is_correct() {
        let home = TempDir::new().expect("tempdir");
        let path = catalog_path_at(home.path(), &CatalogId::from("B::x"));
        assert!(path.ends_with(".atelier/catalogs/B%3A%3Ax.yaml"));
    }

    #[test]
    fn open_creates_private_directories() {
        let home = TempDir::new().expect("tempdir");
        FsKnowledgeBase::open_at(home.path()).expect("open");
        let dir = catalogs_dir_at(home.path());
        assert!(dir.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn publish_writes_document_and_cleans_up_tmp() {
        let home = TempDir::new().expect("tempdir");
        let kb = FsKnowledgeBase::open_at(home.path()).expect("open");
        kb.publish_catalog(CatalogBook::new("B::x").release("", Sku::new("tar", "h1")))
            .expect("publish");

        let path = catalog_path_at(home.path(), &CatalogId::from("B::x"));
        assert!(path.exists());
        assert!(!path.with_extension("yaml.tmp").exists());
    }

    #[test]
    fn non_yaml_files_are_ignored_on_open() {
        let home = TempDir::new().expect("tempdir");
        FsKnowledgeBase::open_at(home.path()).expect("open");
        std::fs::write(catalogs_dir_at(home.path()).join("notes.txt"), "hi").expect("write");
        let kb = FsKnowledgeBase::open_at(home.path()).expect("reopen");
        assert!(kb.list_catalogs().is_empty());
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(KnowledgeBaseError::HomeNotFound
            .to_string()
            .contains("home directory"));
    }
}
