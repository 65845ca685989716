//! Per-version listing of artifacts.
//!
//! A listing sits next to the artifacts it describes, in the version
//! directory, and is written once at insert time.

use std::collections::HashSet;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Document, StorageError, StorageResult};

/// Listing file name prefix
pub const LISTING_PREFIX: &str = "listing-";

/// Listing file name extension
pub const LISTING_EXTENSION: &str = ".json";

/// Length of the random alphanumeric suffix
pub const LISTING_SUFFIX_LEN: usize = 8;

/// Opaque provenance entry describing how an artifact was produced.
pub type ProvenanceRecord = serde_json::Value;

/// One artifact in a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedArtifact {
    /// Logical artifact name, relative to the listing directory
    pub path: String,

    /// Size in bytes
    pub size: u64,

    /// Provenance trail shared by the batch
    pub trail: Vec<ProvenanceRecord>,
}

/// Listing document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub artifacts: Vec<ListedArtifact>,
}

impl Listing {
    /// Parse listing bytes read from `path`.
    pub fn from_json(path: &str, bytes: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(bytes).map_err(|source| StorageError::ListingCorrupted {
            path: path.to_string(),
            source,
        })
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> StorageResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|source| StorageError::Encode {
            document: Document::Listing,
            source,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.artifacts.iter().map(|a| a.size).sum()
    }

    /// Generate a listing file name that collides with none of `taken`.
    pub fn file_name_avoiding<'a>(taken: impl IntoIterator<Item = &'a str>) -> String {
        Self::file_name_avoiding_with(taken, &mut rand::thread_rng())
    }

    /// Same as [`Listing::file_name_avoiding`] with an explicit RNG.
    pub fn file_name_avoiding_with<'a, R: Rng + ?Sized>(
        taken: impl IntoIterator<Item = &'a str>,
        rng: &mut R,
    ) -> String {
        let taken: HashSet<&str> = taken.into_iter().collect();
        loop {
            let suffix: String = (0..LISTING_SUFFIX_LEN)
                .map(|_| char::from(rng.sample(Alphanumeric)))
                .collect();
            let name = format!("{LISTING_PREFIX}{suffix}{LISTING_EXTENSION}");
            if !taken.contains(name.as_str()) {
                return name;
            }
        }
    }

    /// Whether `name` looks like a generated listing file name.
    pub fn is_listing_file_name(name: &str) -> bool {
        name.strip_prefix(LISTING_PREFIX)
            .and_then(|rest| rest.strip_suffix(LISTING_EXTENSION))
            .map(|suffix| {
                suffix.len() == LISTING_SUFFIX_LEN && suffix.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .unwrap_or(false)
    }
}
