use super::{Backend, LocalBackend, add_bucket_name, join_path};
use crate::error::BackendError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Size of each chunk moved between cancellation checks
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

const COPY_SUFFIX: &str = ".copy";

/// Copies archives between a local staging directory and a remote backend.
///
/// Both directions write to `<target>.copy` first and rename onto the final
/// name only after the whole stream has been written, so readers of the
/// final name never see a partial archive.
#[derive(Debug, Clone)]
pub struct Copier {
    remote: Arc<dyn Backend>,
    local: LocalBackend,
    bucket_size: usize,
}

impl Copier {
    /// Create a copier staging files under `local_dir`
    pub fn new(
        local_dir: impl Into<PathBuf>,
        remote: Arc<dyn Backend>,
        bucket_size: usize,
    ) -> Self {
        let local_dir: PathBuf = local_dir.into();
        Self {
            remote,
            local: LocalBackend::new(local_dir.to_string_lossy()),
            bucket_size,
        }
    }

    /// Root of the local staging area
    pub fn local_dir(&self) -> &Path {
        Path::new(self.local.base())
    }

    /// The remote backend
    pub fn remote(&self) -> &Arc<dyn Backend> {
        &self.remote
    }

    /// Full remote path of a blob name, with bucketing applied
    pub fn remote_path(&self, name: &str) -> String {
        join_path(self.remote.base(), &add_bucket_name(name, self.bucket_size))
    }

    fn local_path(&self, name: &str) -> String {
        join_path(self.local.base(), name)
    }

    /// Copy a local file to the remote backend.
    ///
    /// A missing local file is not an error: absent artifacts are valid.
    pub async fn copy_to_remote(
        &self,
        cancel: &CancellationToken,
        src: &str,
        dst: &str,
    ) -> Result<(), BackendError> {
        let src = self.local_path(src);
        let dst = self.remote_path(dst);
        let written = transfer(cancel, &self.local, &src, self.remote.as_ref(), &dst).await?;
        if let Some(bytes) = written {
            tracing::debug!("Copied {} bytes from {} to remote {}", bytes, src, dst);
        }
        Ok(())
    }

    /// Copy a blob from the remote backend to a local file.
    ///
    /// A missing remote blob is not an error: it was never archived.
    pub async fn copy_from_remote(
        &self,
        cancel: &CancellationToken,
        src: &str,
        dst: &str,
    ) -> Result<(), BackendError> {
        let src = self.remote_path(src);
        let dst = self.local_path(dst);
        let written = transfer(cancel, self.remote.as_ref(), &src, &self.local, &dst).await?;
        match written {
            Some(bytes) => tracing::debug!("Copied {} bytes from remote {} to {}", bytes, src, dst),
            None => tracing::debug!("Remote {} does not exist, nothing to copy", src),
        }
        Ok(())
    }
}

/// Stream `src` on `from` into `dst` on `to` through a `.copy` object.
///
/// Returns `None` when the source does not exist.
async fn transfer(
    cancel: &CancellationToken,
    from: &dyn Backend,
    src: &str,
    to: &dyn Backend,
    dst: &str,
) -> Result<Option<u64>, BackendError> {
    let mut reader = match from.open(src).await {
        Ok(reader) => reader,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };

    let dst_copy = format!("{}{}", dst, COPY_SUFFIX);
    let mut writer = to.write_to(&dst_copy).await?;

    let copied = match copy(cancel, &mut writer, &mut reader).await {
        Ok(n) => writer
            .shutdown()
            .await
            .map(|_| n)
            .map_err(|e| BackendError::io(dst_copy.as_str(), e)),
        Err(e) => Err(e),
    };
    drop(writer);

    let copied = match copied {
        Ok(n) => n,
        Err(e) => {
            if let Err(del) = to.delete_if_exists(&dst_copy).await {
                tracing::warn!("Unable to delete partial copy {}: {}", dst_copy, del);
            }
            return Err(e);
        }
    };

    to.rename(&dst_copy, dst).await?;
    Ok(Some(copied))
}

/// Copy in fixed-size chunks, checking for cancellation before each chunk
pub(crate) async fn copy<W, R>(
    cancel: &CancellationToken,
    dst: &mut W,
    src: &mut R,
) -> Result<u64, BackendError>
where
    W: AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        if cancel.is_cancelled() {
            tracing::debug!("Copy cancelled after {} bytes", total);
            return Err(BackendError::Cancelled);
        }

        let n = src
            .read(&mut buf)
            .await
            .map_err(|e| BackendError::io("<source>", e))?;
        if n == 0 {
            return Ok(total);
        }

        dst.write_all(&buf[..n])
            .await
            .map_err(|e| BackendError::io("<destination>", e))?;
        total += n as u64;
    }
}
