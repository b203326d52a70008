//! Identifier newtypes and the SKU release unit.
//!
//! All newtypes serialize transparently as plain strings so YAML documents
//! stay readable (`id: apollo`, not `id: [apollo]`).

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of one artifact stream, e.g. `apollo` or `build-b::x`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(pub String);

impl CatalogId {
    /// Catalog that receives the releases of `commission`'s output slot `output`.
    pub fn for_output(commission: &CommissionId, output: &str) -> Self {
        Self(format!("{}::{}", commission.0, output))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CatalogId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CatalogId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a registered commission.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionId(pub String);

impl CommissionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CommissionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CommissionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Name of a track inside a catalog book. The empty name is the default track.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrackName(pub String);

impl TrackName {
    /// The required default track (`""`).
    pub fn default_track() -> Self {
        Self(String::new())
    }

    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TrackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("<default>")
        } else {
            self.0.fmt(f)
        }
    }
}

impl From<String> for TrackName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TrackName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// SKU
// ---------------------------------------------------------------------------

/// One content-addressable release unit: packing type plus content hash.
///
/// The zero value (empty hash) means "nothing published yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku {
    #[serde(rename = "type")]
    pub packing: String,
    pub hash: String,
}

impl Sku {
    pub fn new(packing: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            packing: packing.into(),
            hash: hash.into(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.hash.is_empty()
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.packing, self.hash)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
