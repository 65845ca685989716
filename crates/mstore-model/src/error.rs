//! Error taxonomy for managed storage operations.

use std::fmt;
use std::io;

use thiserror::Error;

/// Which stored document an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Document {
    Manifest,
    Listing,
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest => write!(f, "manifest"),
            Self::Listing => write!(f, "listing"),
        }
    }
}

/// Errors from managed storage operations.
///
/// I/O failures from the injected [`crate::BlobIo`] are passed through
/// untouched as [`StorageError::Io`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("manifest is corrupted: {source}")]
    ManifestCorrupted {
        #[source]
        source: serde_json::Error,
    },

    #[error("listing '{path}' is corrupted: {source}")]
    ListingCorrupted {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The manifest references a listing that is not (yet) stored.
    #[error("listing '{path}' referenced by the manifest does not exist")]
    ListingMissing { path: String },

    #[error("manifest has no versions")]
    ManifestEmpty,

    #[error("version '{version}' not found in manifest")]
    VersionNotFound { version: String },

    #[error("version '{version}' is ambiguous: {count} manifest items match")]
    VersionAmbiguous { version: String, count: usize },

    #[error("no free version after {attempts} attempts")]
    VersionExhausted { attempts: u32 },

    #[error("failed to encode {document}: {source}")]
    Encode {
        document: Document,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    /// The document a corruption error refers to, if any.
    pub fn corrupted_document(&self) -> Option<Document> {
        match self {
            Self::ManifestCorrupted { .. } => Some(Document::Manifest),
            Self::ListingCorrupted { .. } => Some(Document::Listing),
            _ => None,
        }
    }
}

/// Result type for managed storage operations
pub type StorageResult<T> = Result<T, StorageError>;
