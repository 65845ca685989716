//! Local filesystem blob adapter for mstore
//!
//! Maps slash-separated storage keys onto files below a root directory.
//! Writes go through a temp file and a rename so readers never observe a
//! half-written manifest or listing.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use mstore_model::BlobIo;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::fs;
use tracing::debug;

/// Blob storage rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Create an adapter rooted at `root`. The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage key to a path below the root.
    ///
    /// Leading slashes are treated as relative to the root; `..` segments
    /// are rejected.
    pub fn resolve(&self, key: &str) -> io::Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("storage key escapes root: {}", key),
                    ))
                }
            }
        }
        Ok(path)
    }

    /// Copy a local file to the location of `key`, returning bytes copied.
    pub async fn copy_into(&self, source: &Path, key: &str) -> io::Result<u64> {
        let dest = self.resolve(key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let copied = fs::copy(source, &dest).await?;
        debug!(source = %source.display(), dest = %dest.display(), bytes = copied, "copied artifact");
        Ok(copied)
    }

    /// Remove the directory at `key` recursively. Returns `false` if it did not exist.
    pub async fn remove_dir(&self, key: &str) -> io::Result<bool> {
        let path = self.resolve(key)?;
        match fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed directory");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn temp_path(final_path: &Path) -> PathBuf {
        let file_name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let nonce: String = (0..6)
            .map(|_| char::from(rand::thread_rng().sample(Alphanumeric)))
            .collect();
        final_path.with_file_name(format!(".{}.{}.tmp", file_name, nonce))
    }
}

#[async_trait]
impl BlobIo for LocalFs {
    async fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, key: &str, content: &[u8]) -> io::Result<()> {
        let final_path = self.resolve(key)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = Self::temp_path(&final_path);
        fs::write(&temp_path, content).await?;
        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
        Ok(())
    }
}
