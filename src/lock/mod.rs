//! In-process lock registry keyed by storage root.
//!
//! Each distinct mutex key maps to one async mutex, created on first use and
//! kept for the life of the registry. At most one holder per key runs at a
//! time; unrelated keys never contend. This does not exclude other processes
//! writing to the same physical root.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Caller-supplied identifier for one logical storage root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutexKey(Vec<String>);

impl MutexKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Canonical string form used as the registry key.
    ///
    /// Each part is length-prefixed, so `["a/b"]` and `["a", "b"]` stay distinct.
    pub fn canonical(&self) -> String {
        self.0
            .iter()
            .map(|part| format!("{}:{}", part.len(), part))
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for MutexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl From<&str> for MutexKey {
    fn from(part: &str) -> Self {
        Self::new([part])
    }
}

impl From<Vec<String>> for MutexKey {
    fn from(parts: Vec<String>) -> Self {
        Self(parts)
    }
}

/// Exclusive hold on one storage root. Released on drop.
#[derive(Debug)]
pub struct StorageLock {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl StorageLock {
    /// Canonical key this lock guards.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock explicitly.
    pub fn release(self) {
        debug!(key = %self.key, "released storage lock");
    }
}

/// Lock manager handed to the storage capability.
#[derive(Debug, Default)]
pub struct MutexRegistry {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MutexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &MutexKey) -> StorageLock {
        let canonical = key.canonical();
        let lock = self
            .locks
            .entry(canonical.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = match lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(key = %key, "storage lock busy, waiting");
                let start = Instant::now();
                let guard = lock.lock_owned().await;
                debug!(
                    key = %key,
                    waited_ms = start.elapsed().as_millis() as u64,
                    "storage lock acquired after contention"
                );
                guard
            }
        };

        StorageLock {
            key: canonical,
            _guard: guard,
        }
    }

    /// Number of keys that have ever been locked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
