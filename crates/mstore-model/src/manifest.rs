//! The manifest: append-only catalog of every version in a storage root.
//!
//! Stored as `manifest.json` at the root of the base directory:
//!
//! ```json
//! { "items": [ { "version": "...", "totalSize": 42, "listingPath": "<version>/listing-ab12cd34.json" } ] }
//! ```
//!
//! `listingPath` is relative to the manifest's own directory.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Document, StorageError, StorageResult};
use crate::key::parent_key;
use crate::version::Version;

/// Well-known manifest file name
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// One version entry in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    /// Version identifier of the append event
    pub version: Version,

    /// Sum of artifact sizes in bytes
    pub total_size: u64,

    /// Listing location, relative to the manifest directory
    pub listing_path: String,
}

impl ManifestItem {
    /// Most-recent-first comparator.
    ///
    /// Duplicate versions compare equal and keep no particular order; they
    /// are reported as ambiguity at selection time instead.
    pub fn sort(a: &Self, b: &Self) -> Ordering {
        b.version.compare(&a.version)
    }

    /// Directory segment of the listing path (the version directory).
    pub fn version_dir(&self) -> &str {
        parent_key(&self.listing_path)
    }
}

/// Manifest document (manifest.json)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub items: Vec<ManifestItem>,
}

impl Manifest {
    /// Parse manifest bytes; schema failures become [`StorageError::ManifestCorrupted`].
    pub fn from_json(bytes: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(bytes).map_err(|source| StorageError::ManifestCorrupted { source })
    }

    /// Parse optional manifest content, treating absence as an empty manifest.
    pub fn from_optional(bytes: Option<&[u8]>) -> StorageResult<Self> {
        match bytes {
            Some(bytes) => Self::from_json(bytes),
            None => Ok(Self::default()),
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> StorageResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|source| StorageError::Encode {
            document: Document::Manifest,
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn contains_version(&self, version: &Version) -> bool {
        self.items.iter().any(|item| &item.version == version)
    }

    /// Append a new item. Uniqueness is the caller's concern.
    pub fn push(&mut self, item: ManifestItem) {
        self.items.push(item);
    }

    /// Total bytes recorded across all versions.
    pub fn total_size(&self) -> u64 {
        self.items.iter().map(|item| item.total_size).sum()
    }

    /// Items ordered most recent first.
    pub fn sorted_items(&self) -> Vec<ManifestItem> {
        let mut items = self.items.clone();
        items.sort_by(ManifestItem::sort);
        items
    }

    /// Most recent item, if any.
    pub fn latest(&self) -> Option<&ManifestItem> {
        self.items
            .iter()
            .min_by(|a, b| ManifestItem::sort(a, b))
    }

    /// Items whose version string equals `version` exactly.
    pub fn matching(&self, version: &str) -> Vec<&ManifestItem> {
        self.items
            .iter()
            .filter(|item| item.version == version)
            .collect()
    }

    /// Split into (retained, removable) by recency rank.
    ///
    /// The `max_versions` most recent items are retained; everything at rank
    /// `max_versions` or later is removable.
    pub fn partition_recent(&self, max_versions: usize) -> (Manifest, Vec<ManifestItem>) {
        let mut items = self.sorted_items();
        let removable = if max_versions < items.len() {
            items.split_off(max_versions)
        } else {
            Vec::new()
        };
        (Manifest { items }, removable)
    }
}
