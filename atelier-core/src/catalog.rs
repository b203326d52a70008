//! Catalog books: copy-on-write release history of one artifact stream.
//!
//! A [`CatalogBook`] value is never mutated in place. [`CatalogBook::release`]
//! returns a new book; the receiver and every clone of it keep observing the
//! history they had. Tracks are shared through `Arc`, so a release copies only
//! the track being appended to.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{CatalogId, Sku, TrackName};

/// Versioned release history for one catalog, organised into tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogBook {
    pub id: CatalogId,
    #[serde(default)]
    tracks: BTreeMap<TrackName, Arc<Vec<Sku>>>,
}

impl CatalogBook {
    /// An empty book with no tracks.
    pub fn new(id: impl Into<CatalogId>) -> Self {
        Self {
            id: id.into(),
            tracks: BTreeMap::new(),
        }
    }

    /// Returns a new book with `sku` appended to `track`. `self` is unchanged.
    #[must_use]
    pub fn release(&self, track: impl Into<TrackName>, sku: Sku) -> CatalogBook {
        let mut next = self.clone();
        // `self` still holds a reference, so make_mut copies the track.
        Arc::make_mut(next.tracks.entry(track.into()).or_default()).push(sku);
        next
    }

    /// Newest SKU on the default track, or the zero SKU if nothing is published.
    pub fn latest(&self) -> Sku {
        self.latest_on(&TrackName::default_track())
    }

    /// Newest SKU on `track`, or the zero SKU.
    pub fn latest_on(&self, track: &TrackName) -> Sku {
        self.track(track).last().cloned().unwrap_or_default()
    }

    /// The default track's release sequence, oldest first.
    pub fn all(&self) -> &[Sku] {
        self.track(&TrackName::default_track())
    }

    /// Release sequence of `track`, oldest first. Empty if the track is absent.
    pub fn track(&self, track: &TrackName) -> &[Sku] {
        self.tracks.get(track).map(|t| t.as_slice()).unwrap_or(&[])
    }

    /// Names of every track present in the book.
    pub fn track_names(&self) -> impl Iterator<Item = &TrackName> {
        self.tracks.keys()
    }

    /// Replays the releases `self` added on top of `base` onto `onto`.
    ///
    /// A track of `self` that extends the same track of `base` contributes only
    /// its new SKUs, appended after whatever `onto` holds. A track that does not
    /// extend `base` replaces `onto`'s. Tracks only `onto` knows are kept.
    #[must_use]
    pub fn rebase(&self, base: &CatalogBook, onto: &CatalogBook) -> CatalogBook {
        let mut next = onto.clone();
        next.id = self.id.clone();
        for (name, track) in &self.tracks {
            let prior = base.track(name);
            match track.strip_prefix(prior) {
                Some([]) => {}
                Some(added) => {
                    Arc::make_mut(next.tracks.entry(name.clone()).or_default())
                        .extend_from_slice(added);
                }
                None => {
                    next.tracks.insert(name.clone(), Arc::clone(track));
                }
            }
        }
        next
    }
}
