//! mstore data model
//!
//! Version identifiers, the manifest and listing documents, the error
//! taxonomy, and the blob I/O port shared by the storage capability and
//! its adapters.

pub mod error;
pub mod io;
pub mod key;
pub mod listing;
pub mod manifest;
pub mod version;

pub use error::{Document, StorageError, StorageResult};
pub use io::BlobIo;
pub use key::{join_key, parent_key};
pub use listing::{ListedArtifact, Listing, ProvenanceRecord, LISTING_EXTENSION, LISTING_PREFIX};
pub use manifest::{Manifest, ManifestItem, MANIFEST_FILE_NAME};
pub use version::{parse_offset, Version, VersionParseError, VERSION_FORMAT};
