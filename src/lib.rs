//! mstore - versioned artifact storage
//!
//! Keeps a catalog of artifact batches written under a storage root. Each
//! insert appends a timestamped version to the root's manifest and writes a
//! listing for the batch; consumers resolve the latest or a specific version,
//! and retention drops old versions from the manifest.

pub mod batch;
pub mod config;
pub mod lock;
pub mod memory;
pub mod storage;

pub use lock::{MutexKey, MutexRegistry, StorageLock};
pub use memory::MemoryIo;
pub use storage::{
    ArtifactInput, CleanOutcome, InsertOutcome, InsertableArtifact, ManagedStorage, RetentionPolicy,
    SelectOutcome, SelectableArtifact, Selection, StorageOptions,
};

pub use mstore_model::{
    BlobIo, Listing, Manifest, ManifestItem, ProvenanceRecord, StorageError, StorageResult, Version,
};
