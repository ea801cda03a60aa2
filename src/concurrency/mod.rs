//! Coordination primitives shared by the indexing workers

/// Reference counted per-key async locks
pub mod keyed_lock;
/// Bounded worker pool
pub mod worker_set;

pub use keyed_lock::{KeyedLockGuard, KeyedLocks};
pub use worker_set::{WorkerSet, WorkerSetClosed};
