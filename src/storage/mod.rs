//! Blob storage backends and the atomic copier on top of them
//!
//! A [`Backend`] is a dumb byte store addressed by slash separated paths. The
//! [`Copier`] moves archives between the local staging area and a backend
//! and is the only place that knows about `.copy` staging and bucketing.

/// Atomic, cancellable transfers between local staging and a backend
pub mod copier;
/// Local filesystem backend
pub mod local;
/// Remote backend on top of `object_store`
pub mod remote;

pub use copier::Copier;
pub use local::LocalBackend;
pub use remote::RemoteBackend;

use crate::error::BackendError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use url::Url;

/// Reader returned by [`Backend::open`]
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writer returned by [`Backend::write_to`]. Data is only guaranteed to be
/// persisted once `shutdown` has completed successfully.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Uniform contract over a local or remote byte store
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Open a reader. Missing objects yield [`BackendError::NotFound`].
    async fn open(&self, path: &str) -> Result<BoxReader, BackendError>;

    /// Create or truncate an object and return a writer for it
    async fn write_to(&self, path: &str) -> Result<BoxWriter, BackendError>;

    /// Atomically replace `dst` with `src`
    async fn rename(&self, src: &str, dst: &str) -> Result<(), BackendError>;

    /// Delete an object, succeeding when it does not exist
    async fn delete_if_exists(&self, path: &str) -> Result<(), BackendError>;

    /// Base path every blob path is joined onto
    fn base(&self) -> &str;

    /// Base path for temporary directories
    fn temp_dir(&self) -> &str;
}

/// Prepend the bucket directory to a blob name.
///
/// The bucket is the first `bucket_size` characters of the name; a size of 0
/// returns the name as is.
pub fn add_bucket_name(name: &str, bucket_size: usize) -> String {
    if bucket_size == 0 || name.len() < bucket_size || !name.is_char_boundary(bucket_size) {
        return name.to_string();
    }

    join_path(&name[..bucket_size], name)
}

/// Join two slash separated paths, ignoring empty components
pub fn join_path(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, name),
    }
}

/// Resolve a configured target into a backend.
///
/// Targets with a URL scheme go to [`RemoteBackend`]; anything else is a
/// local directory. `temp_dir` is where remote `.copy` objects may live and
/// defaults to the base when empty.
pub fn backend_for_target(target: &str, temp_dir: &str) -> Result<Arc<dyn Backend>, BackendError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(BackendError::InvalidTarget {
            target: target.to_string(),
            reason: "target is empty".to_string(),
        });
    }

    match Url::parse(target) {
        // A single letter scheme is a Windows drive, not a URL
        Ok(url) if url.scheme().len() > 1 => {
            tracing::info!("Using remote backend at {}", url);
            Ok(Arc::new(RemoteBackend::new(url, temp_dir)?))
        }
        _ => {
            tracing::info!("Using local backend at {}", target);
            Ok(Arc::new(LocalBackend::new(target)))
        }
    }
}
