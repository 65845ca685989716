//! Resolve a version of a storage root and enumerate its artifacts.

use mstore_model::{join_key, BlobIo, Listing, Manifest, ManifestItem, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{read_manifest, ManagedStorage};
use crate::lock::MutexKey;

/// Which version `select` resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum Selection {
    /// Most recent version by instant
    Latest,
    /// The item whose version string equals `version` exactly
    Specific { version: String },
}

impl Selection {
    pub fn specific(version: impl Into<String>) -> Self {
        Self::Specific {
            version: version.into(),
        }
    }
}

/// One artifact of a resolved version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectableArtifact {
    /// Logical artifact name
    pub name: String,
    /// `<base>/<version>/<name>`
    pub path: String,
}

/// Result of `select`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOutcome {
    /// Directory segment of the resolved listing path
    pub resolved_version: String,
    pub selectable_artifacts: Vec<SelectableArtifact>,
}

/// Pick the manifest item a selection refers to.
pub fn resolve_item<'a>(manifest: &'a Manifest, selection: &Selection) -> StorageResult<&'a ManifestItem> {
    match selection {
        Selection::Latest => manifest.latest().ok_or(StorageError::ManifestEmpty),
        Selection::Specific { version } => {
            let matches = manifest.matching(version);
            match matches.as_slice() {
                [] => Err(StorageError::VersionNotFound {
                    version: version.clone(),
                }),
                [item] => Ok(*item),
                _ => Err(StorageError::VersionAmbiguous {
                    version: version.clone(),
                    count: matches.len(),
                }),
            }
        }
    }
}

impl ManagedStorage {
    /// Resolve `selection` and list the artifacts stored for it.
    ///
    /// Only the manifest read happens under the root lock.
    pub async fn select<I>(
        &self,
        io: &I,
        base: &str,
        key: &MutexKey,
        selection: &Selection,
    ) -> StorageResult<SelectOutcome>
    where
        I: BlobIo + ?Sized,
    {
        let lock = self.registry.acquire(key).await;
        let manifest = read_manifest(io, base).await?;
        lock.release();

        let item = resolve_item(&manifest, selection)?;
        let version_dir = item.version_dir();
        debug!(base, version = %item.version, ?selection, "resolved version");

        let listing_path = join_key([base, item.listing_path.as_str()]);
        let bytes = io
            .read(&listing_path)
            .await?
            .ok_or_else(|| StorageError::ListingMissing {
                path: listing_path.clone(),
            })?;
        let listing = Listing::from_json(&listing_path, &bytes)?;

        let selectable_artifacts = listing
            .artifacts
            .into_iter()
            .map(|artifact| SelectableArtifact {
                path: join_key([base, version_dir, artifact.path.as_str()]),
                name: artifact.path,
            })
            .collect();

        Ok(SelectOutcome {
            resolved_version: version_dir.to_string(),
            selectable_artifacts,
        })
    }
}
