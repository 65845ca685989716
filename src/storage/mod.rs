//! Managed storage capability
//!
//! Maintains a versioned catalog of artifact batches under a base directory:
//!
//! ```text
//! <base>/manifest.json                      catalog of every version
//! <base>/<version>/listing-XXXXXXXX.json    per-version artifact index
//! <base>/<version>/<artifact name>          bytes, copied by the caller
//! ```
//!
//! Every manifest read-modify-write, and the manifest read in `select`, runs
//! under the registry lock for the root's mutex key. Listings are written once
//! and read without locking.
//!
//! `insert` commits the manifest before writing the listing, so a crash or a
//! concurrent `select` between the two steps can see a manifest item whose
//! listing does not exist yet ([`mstore_model::StorageError::ListingMissing`]).

mod clean;
mod insert;
mod select;

use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use mstore_model::{join_key, BlobIo, Manifest, ManifestItem, StorageResult, MANIFEST_FILE_NAME};
use tracing::debug;

use crate::lock::{MutexKey, MutexRegistry};

pub use clean::{CleanOutcome, RetentionPolicy};
pub use insert::{ArtifactInput, InsertOutcome, InsertableArtifact};
pub use select::{resolve_item, SelectOutcome, SelectableArtifact, Selection};

/// Default wait between version collision retries
pub const DEFAULT_COLLISION_INTERVAL: Duration = Duration::from_millis(10);

/// Tunables for the storage capability.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Offset new versions are rendered in
    pub offset: FixedOffset,
    /// Sleep between colliding version samples
    pub collision_interval: Duration,
    /// Give up after this many colliding samples (None = retry until free)
    pub max_collision_attempts: Option<u32>,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            offset: Utc.fix(),
            collision_interval: DEFAULT_COLLISION_INTERVAL,
            max_collision_attempts: None,
        }
    }
}

/// Insert, select and clean versions of a storage root.
#[derive(Debug, Clone)]
pub struct ManagedStorage {
    registry: Arc<MutexRegistry>,
    options: StorageOptions,
}

impl ManagedStorage {
    pub fn new(registry: Arc<MutexRegistry>) -> Self {
        Self::with_options(registry, StorageOptions::default())
    }

    pub fn with_options(registry: Arc<MutexRegistry>, options: StorageOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<MutexRegistry> {
        &self.registry
    }

    /// All versions of the root, most recent first.
    pub async fn versions<I>(&self, io: &I, base: &str, key: &MutexKey) -> StorageResult<Vec<ManifestItem>>
    where
        I: BlobIo + ?Sized,
    {
        let lock = self.registry.acquire(key).await;
        let manifest = read_manifest(io, base).await?;
        lock.release();
        Ok(manifest.sorted_items())
    }
}

/// Location of the manifest for `base`.
pub fn manifest_key(base: &str) -> String {
    join_key([base, MANIFEST_FILE_NAME])
}

/// Read and parse the manifest, treating absence as empty.
async fn read_manifest<I>(io: &I, base: &str) -> StorageResult<Manifest>
where
    I: BlobIo + ?Sized,
{
    let key = manifest_key(base);
    let bytes = io.read(&key).await?;
    let manifest = Manifest::from_optional(bytes.as_deref())?;
    debug!(manifest = %key, items = manifest.len(), "read manifest");
    Ok(manifest)
}

async fn write_manifest<I>(io: &I, base: &str, manifest: &Manifest) -> StorageResult<()>
where
    I: BlobIo + ?Sized,
{
    let key = manifest_key(base);
    io.write(&key, &manifest.to_json()?).await?;
    debug!(manifest = %key, items = manifest.len(), "wrote manifest");
    Ok(())
}
