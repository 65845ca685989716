//! The read/write port managed storage is built on.
//!
//! Implemented by blob-store adapters (local filesystem, object storage, in-memory).

use std::io;

use async_trait::async_trait;

/// Narrow blob access used by managed storage.
#[async_trait]
pub trait BlobIo: Send + Sync {
    /// Read the full content at `path`, or `None` if nothing is stored there.
    async fn read(&self, path: &str) -> io::Result<Option<Vec<u8>>>;

    /// Write `content` to `path`, replacing anything already there.
    async fn write(&self, path: &str, content: &[u8]) -> io::Result<()>;
}
