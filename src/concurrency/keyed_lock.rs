//! Per-key locking for content-addressed roots
//!
//! Every root hash gets its own async mutex so that only one transaction on a
//! given archive is open at a time, while distinct roots never wait on each
//! other. Entries are reference counted and removed from the registry when
//! the last holder or waiter goes away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

struct LockEntry {
    mutex: Arc<tokio::sync::Mutex<()>>,
    /// Callers currently holding or waiting for this key
    holders: usize,
}

type Registry = Arc<Mutex<HashMap<String, LockEntry>>>;

/// Registry mapping keys to dedicated mutexes, shared by all workers
#[derive(Clone, Default)]
pub struct KeyedLocks {
    entries: Registry,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(entries: &Registry) -> MutexGuard<'_, HashMap<String, LockEntry>> {
        // The map is never left half-updated, a poisoned lock is still usable
        entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for exclusive access to `key`.
    ///
    /// The lock is held until the returned guard is dropped. Dropping the
    /// future before it resolves releases the registration as well.
    pub async fn lock(&self, key: &str) -> KeyedLockGuard {
        let registration = self.register(key);
        let guard = registration.mutex.clone().lock_owned().await;
        tracing::trace!("Acquired lock for {}", key);
        KeyedLockGuard {
            _guard: guard,
            _registration: registration,
        }
    }

    fn register(&self, key: &str) -> Registration {
        let mut entries = Self::registry(&self.entries);
        let entry = entries.entry(key.to_string()).or_insert_with(|| LockEntry {
            mutex: Arc::new(tokio::sync::Mutex::new(())),
            holders: 0,
        });
        entry.holders += 1;

        Registration {
            key: key.to_string(),
            mutex: entry.mutex.clone(),
            entries: self.entries.clone(),
        }
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        Self::registry(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accounts for one holder or waiter of a key
struct Registration {
    key: String,
    mutex: Arc<tokio::sync::Mutex<()>>,
    entries: Registry,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut entries = KeyedLocks::registry(&self.entries);
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.holders -= 1;
            if entry.holders == 0 {
                entries.remove(&self.key);
            }
        }
    }
}

/// Exclusive access to one key, released on drop
pub struct KeyedLockGuard {
    // Field order matters: the mutex is unlocked before the registration
    // is released.
    _guard: OwnedMutexGuard<()>,
    _registration: Registration,
}
