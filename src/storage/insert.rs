//! Append a new version to a storage root.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use mstore_model::{
    join_key, BlobIo, ListedArtifact, Listing, Manifest, ManifestItem, ProvenanceRecord, StorageError,
    StorageResult, Version,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{read_manifest, write_manifest, ManagedStorage};
use crate::lock::MutexKey;

/// One artifact of the batch being inserted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInput {
    /// Logical name, unique within the batch
    pub name: String,
    /// Where the caller currently holds the bytes
    pub path: String,
    /// Size in bytes
    pub size: u64,
}

impl ArtifactInput {
    pub fn new(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
        }
    }
}

/// Copy instruction for one inserted artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertableArtifact {
    pub name: String,
    /// Original location handed to `insert`
    pub source_path: String,
    /// `<base>/<version>/<name>`
    pub destination_path: String,
}

/// Result of `insert`. The caller copies each artifact's bytes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub version: Version,
    /// Full key of the listing written for this version
    pub listing_path: String,
    pub insertable_artifacts: Vec<InsertableArtifact>,
}

impl ManagedStorage {
    /// Record a new version holding `artifacts` and return where each should be copied.
    ///
    /// The manifest item is committed under the root lock; the listing is
    /// written after the lock is released. Bytes are not copied here.
    pub async fn insert<I>(
        &self,
        io: &I,
        base: &str,
        key: &MutexKey,
        artifacts: &[ArtifactInput],
        trail: &[ProvenanceRecord],
    ) -> StorageResult<InsertOutcome>
    where
        I: BlobIo + ?Sized,
    {
        let listing_name = Listing::file_name_avoiding(artifacts.iter().map(|a| a.name.as_str()));
        let total_size: u64 = artifacts.iter().map(|a| a.size).sum();

        let lock = self.registry.acquire(key).await;
        let mut manifest = read_manifest(io, base).await?;
        let version = self.free_version(&manifest).await?;
        let relative_listing = join_key([version.as_str(), listing_name.as_str()]);
        manifest.push(ManifestItem {
            version: version.clone(),
            total_size,
            listing_path: relative_listing,
        });
        write_manifest(io, base, &manifest).await?;
        lock.release();

        info!(
            base,
            version = %version,
            artifacts = artifacts.len(),
            total_size,
            "committed version"
        );

        let listing = Listing {
            artifacts: artifacts
                .iter()
                .map(|artifact| ListedArtifact {
                    path: artifact.name.clone(),
                    size: artifact.size,
                    trail: trail.to_vec(),
                })
                .collect(),
        };
        let listing_path = join_key([base, version.as_str(), listing_name.as_str()]);
        io.write(&listing_path, &listing.to_json()?).await?;
        debug!(listing = %listing_path, "wrote listing");

        let insertable_artifacts = artifacts
            .iter()
            .map(|artifact| InsertableArtifact {
                name: artifact.name.clone(),
                source_path: artifact.path.clone(),
                destination_path: join_key([base, version.as_str(), artifact.name.as_str()]),
            })
            .collect();

        Ok(InsertOutcome {
            version,
            listing_path,
            insertable_artifacts,
        })
    }

    /// Sample the clock until the version is not already in the manifest.
    ///
    /// Versions are compared by instant, so a sample equal to an existing
    /// version written under another offset also counts as a collision.
    async fn free_version(&self, manifest: &Manifest) -> StorageResult<Version> {
        let taken: HashSet<DateTime<FixedOffset>> =
            manifest.items.iter().map(|item| item.version.instant()).collect();

        let mut attempts: u32 = 0;
        loop {
            let candidate = Version::now(self.options.offset);
            if !taken.contains(&candidate.instant()) {
                return Ok(candidate);
            }

            attempts += 1;
            if let Some(max) = self.options.max_collision_attempts {
                if attempts >= max {
                    warn!(attempts, "no free version");
                    return Err(StorageError::VersionExhausted { attempts });
                }
            }
            debug!(candidate = %candidate, attempt = attempts, "version collision, retrying");
            tokio::time::sleep(self.options.collision_interval).await;
        }
    }
}
