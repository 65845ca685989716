//! In-memory blob store.
//!
//! Backs tests and dry runs. Supports injecting I/O failures per key so
//! error propagation through the storage capability can be exercised.

use std::collections::{BTreeMap, HashMap};
use std::io;

use async_trait::async_trait;
use mstore_model::BlobIo;
use parking_lot::{Mutex, RwLock};

/// Which side of the blob interface a failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoOp {
    Read,
    Write,
}

/// Failure injected for one key and operation
#[derive(Debug, Clone)]
struct InjectedFailure {
    kind: io::ErrorKind,
    message: String,
    /// Remaining failures before succeeding (None = always fail)
    remaining: Option<u32>,
}

/// Blob storage held in a map.
#[derive(Debug, Default)]
pub struct MemoryIo {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<(IoOp, String), InjectedFailure>>,
}

impl MemoryIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored content at `key`, bypassing failure injection.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(key).cloned()
    }

    /// Store content directly, bypassing failure injection.
    pub fn put(&self, key: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.blobs.write().insert(key.into(), content.into());
    }

    pub fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.write().remove(key)
    }

    /// All stored keys in lexical order.
    pub fn keys(&self) -> Vec<String> {
        self.blobs.read().keys().cloned().collect()
    }

    /// Make every `op` on `key` fail with `kind`.
    pub fn fail(&self, op: IoOp, key: impl Into<String>, kind: io::ErrorKind) {
        self.inject(op, key.into(), kind, None);
    }

    /// Make the next `count` calls of `op` on `key` fail with `kind`.
    pub fn fail_times(&self, op: IoOp, key: impl Into<String>, kind: io::ErrorKind, count: u32) {
        self.inject(op, key.into(), kind, Some(count));
    }

    fn inject(&self, op: IoOp, key: String, kind: io::ErrorKind, remaining: Option<u32>) {
        let message = format!("injected {:?} failure on {}", op, key);
        self.failures.lock().insert(
            (op, key),
            InjectedFailure {
                kind,
                message,
                remaining,
            },
        );
    }

    fn check_failure(&self, op: IoOp, key: &str) -> io::Result<()> {
        let mut failures = self.failures.lock();
        let entry_key = (op, key.to_string());
        let Some(failure) = failures.get_mut(&entry_key) else {
            return Ok(());
        };

        let err = io::Error::new(failure.kind, failure.message.clone());
        let outcome = match &mut failure.remaining {
            None => Err(err),
            Some(0) => Ok(()),
            Some(n) => {
                *n -= 1;
                Err(err)
            }
        };
        if failure.remaining == Some(0) {
            failures.remove(&entry_key);
        }
        outcome
    }
}

#[async_trait]
impl BlobIo for MemoryIo {
    async fn read(&self, path: &str) -> io::Result<Option<Vec<u8>>> {
        self.check_failure(IoOp::Read, path)?;
        Ok(self.get(path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> io::Result<()> {
        self.check_failure(IoOp::Write, path)?;
        self.put(path, content.to_vec());
        Ok(())
    }
}
