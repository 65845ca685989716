//! Count-based retention over a storage root.
//!
//! Only manifest references are dropped. Listings and artifact bytes stay in
//! place until the caller deletes them using the returned items.

use mstore_model::{join_key, BlobIo, ManifestItem, StorageResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{read_manifest, write_manifest, ManagedStorage};
use crate::lock::MutexKey;

/// Retention policy for a storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    /// Number of most recent versions to keep
    pub max_versions: usize,
}

impl RetentionPolicy {
    /// Keep the `count` most recent versions.
    pub fn keep_last_n(count: usize) -> Self {
        Self {
            max_versions: count,
        }
    }
}

/// Result of `clean`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanOutcome {
    /// Items dropped from the manifest, most recent first
    pub removable_items: Vec<ManifestItem>,
    /// Items still referenced by the manifest
    pub retained: usize,
}

impl CleanOutcome {
    /// Version directories the caller may now delete, as storage keys under `base`.
    pub fn removable_dirs(&self, base: &str) -> Vec<String> {
        self.removable_items
            .iter()
            .map(|item| join_key([base, item.version_dir()]))
            .collect()
    }

    /// Bytes recorded for the removable versions.
    pub fn reclaimable_bytes(&self) -> u64 {
        self.removable_items.iter().map(|item| item.total_size).sum()
    }
}

impl ManagedStorage {
    /// Drop every version ranked at or beyond `policy.max_versions`.
    pub async fn clean<I>(
        &self,
        io: &I,
        base: &str,
        key: &MutexKey,
        policy: &RetentionPolicy,
    ) -> StorageResult<CleanOutcome>
    where
        I: BlobIo + ?Sized,
    {
        let lock = self.registry.acquire(key).await;
        let manifest = read_manifest(io, base).await?;
        let (retained, removable_items) = manifest.partition_recent(policy.max_versions);

        if removable_items.is_empty() {
            debug!(base, items = manifest.len(), "nothing to clean");
        } else {
            write_manifest(io, base, &retained).await?;
            info!(
                base,
                retained = retained.len(),
                removed = removable_items.len(),
                "applied retention"
            );
        }
        lock.release();

        Ok(CleanOutcome {
            retained: retained.len(),
            removable_items,
        })
    }
}
