//! Transactions on rooted repositories stored as siva archives
//!
//! Beginning a transaction copies `<root>.siva` from the remote store into a
//! private staging directory and opens it as a bare git repository. Commit
//! packs the repository back into an archive and uploads it through the
//! copier; rollback only discards the staging directory.

use crate::error::TransactionError;
use crate::siva;
use crate::storage::Copier;
use crate::types::RootHash;
use async_trait::async_trait;
use git2::Repository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const ARCHIVE_FILE: &str = "siva";
const REPOSITORY_DIR: &str = "repo";

/// Starts transactions on rooted repositories
#[async_trait]
pub trait RootedTransactioner: Send + Sync {
    /// Stage the archive of `root` and open it as a repository store
    async fn begin(
        &self,
        cancel: &CancellationToken,
        root: &RootHash,
    ) -> Result<Transaction, TransactionError>;
}

/// Transactioner for archives kept in a remote backend behind a [`Copier`].
///
/// Transactionality is only as strong as the backend's rename: if a commit
/// fails half way the remote archive keeps its previous content.
pub struct SivaRootedTransactioner {
    copier: Arc<Copier>,
    cleanup_failed_begin: bool,
}

impl SivaRootedTransactioner {
    pub fn new(copier: Arc<Copier>) -> Self {
        Self {
            copier,
            cleanup_failed_begin: true,
        }
    }

    /// Whether a failed `begin` removes its staging directory (the default).
    ///
    /// Disabling it reproduces the historical behaviour of leaving the
    /// directory behind, which some migration checks compare against.
    pub fn with_cleanup_failed_begin(mut self, cleanup: bool) -> Self {
        self.cleanup_failed_begin = cleanup;
        self
    }

    pub fn copier(&self) -> &Arc<Copier> {
        &self.copier
    }

    async fn create_staging(&self, root: &RootHash) -> Result<StagingDir, TransactionError> {
        let local = self.copier.local_dir().to_path_buf();
        tokio::fs::create_dir_all(&local)
            .await
            .map_err(|e| staging_error(&local, e))?;

        let mut nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        loop {
            let name = format!("{}_{}", root, nanos);
            let path = local.join(&name);
            match tokio::fs::create_dir(&path).await {
                Ok(()) => return Ok(StagingDir::new(name, path)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => nanos += 1,
                Err(e) => return Err(staging_error(&path, e)),
            }
        }
    }

    async fn stage(
        &self,
        cancel: &CancellationToken,
        root: &RootHash,
        staging: &StagingDir,
    ) -> Result<Repository, TransactionError> {
        let blob = root.siva_file_name();
        self.copier
            .copy_from_remote(cancel, &blob, &staging.archive_name())
            .await
            .map_err(|source| TransactionError::Fetch { blob, source })?;

        let archive = staging.archive_path();
        let repo_dir = staging.repository_path();
        tokio::task::spawn_blocking(move || open_repository(&archive, &repo_dir))
            .await
            .map_err(|e| TransactionError::TaskFailed(e.to_string()))?
    }
}

#[async_trait]
impl RootedTransactioner for SivaRootedTransactioner {
    async fn begin(
        &self,
        cancel: &CancellationToken,
        root: &RootHash,
    ) -> Result<Transaction, TransactionError> {
        let staging = self.create_staging(root).await?;

        match self.stage(cancel, root, &staging).await {
            Ok(repo) => {
                tracing::debug!("Began transaction on {} at {}", root, staging.path.display());
                Ok(Transaction {
                    root: root.clone(),
                    copier: self.copier.clone(),
                    repo,
                    staging,
                })
            }
            Err(e) => {
                if !self.cleanup_failed_begin {
                    tracing::debug!(
                        "Leaving staging directory {} after failed begin",
                        staging.path.display()
                    );
                    staging.leak();
                } else if let Err(cleanup) = staging.remove().await {
                    tracing::warn!(
                        "Unable to clean up after failed begin on {}: {}",
                        root,
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }
}

fn staging_error(path: &Path, source: std::io::Error) -> TransactionError {
    TransactionError::Staging {
        path: path.display().to_string(),
        source,
    }
}

/// Unpack the staged archive, or create an empty store when there is none
fn open_repository(archive: &Path, repo_dir: &Path) -> Result<Repository, TransactionError> {
    let has_archive = std::fs::metadata(archive)
        .map(|m| m.len() > 0)
        .unwrap_or(false);

    if !has_archive {
        return Repository::init_bare(repo_dir)
            .map_err(|e| TransactionError::Repository(e.message().to_string()));
    }

    siva::unpack(archive, repo_dir)?;
    // Empty directories are not archived but git expects them
    for dir in ["objects", "refs"] {
        let path = repo_dir.join(dir);
        std::fs::create_dir_all(&path).map_err(|e| staging_error(&path, e))?;
    }

    Repository::open_bare(repo_dir)
        .map_err(|e| TransactionError::Repository(e.message().to_string()))
}

/// Private staging directory of one transaction, removed on drop unless leaked
struct StagingDir {
    name: String,
    path: PathBuf,
    armed: bool,
}

impl StagingDir {
    fn new(name: String, path: PathBuf) -> Self {
        Self {
            name,
            path,
            armed: true,
        }
    }

    /// Archive path relative to the copier's local directory
    fn archive_name(&self) -> String {
        format!("{}/{}", self.name, ARCHIVE_FILE)
    }

    fn archive_path(&self) -> PathBuf {
        self.path.join(ARCHIVE_FILE)
    }

    fn repository_path(&self) -> PathBuf {
        self.path.join(REPOSITORY_DIR)
    }

    fn leak(mut self) {
        self.armed = false;
    }

    async fn remove(mut self) -> Result<(), TransactionError> {
        self.armed = false;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(staging_error(&self.path, e)),
        }
    }
}

/// Whether the current thread is driven by a tokio runtime
fn in_runtime() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::warn!(
            "Transaction staging {} dropped without commit or rollback, removing",
            self.path.display()
        );
        if in_runtime() {
            tracing::warn!(
                "Removing {} synchronously on an async runtime thread",
                self.path.display()
            );
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::error!("Unable to remove {}: {}", self.path.display(), e);
        }
    }
}

/// Staged view of one root archive.
///
/// `commit` and `rollback` consume the transaction, so exactly one of them
/// can run. A transaction dropped without either is rolled back.
pub struct Transaction {
    root: RootHash,
    copier: Arc<Copier>,
    repo: Repository,
    staging: StagingDir,
}

impl Transaction {
    pub fn root(&self) -> &RootHash {
        &self.root
    }

    /// The repository store. The same instance is returned until the
    /// transaction ends.
    pub fn storer(&self) -> &Repository {
        &self.repo
    }

    /// Local staging directory of this transaction
    pub fn staging_path(&self) -> &Path {
        &self.staging.path
    }

    /// Size in bytes of the staged archive, 0 when the root was never archived
    pub fn archive_size(&self) -> u64 {
        std::fs::metadata(self.staging.archive_path())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Pack the repository and upload it over `<root>.siva`.
    ///
    /// The staging directory is removed whatever the outcome; an upload error
    /// is still returned.
    pub async fn commit(self, cancel: &CancellationToken) -> Result<(), TransactionError> {
        let Transaction {
            root,
            copier,
            repo,
            staging,
        } = self;
        drop(repo);

        let result = upload(cancel, &root, &copier, &staging).await;
        let cleanup = staging.remove().await;

        match (&result, &cleanup) {
            (Ok(()), Ok(())) => tracing::debug!("Committed transaction on {}", root),
            (Err(e), _) => tracing::warn!("Commit on {} failed: {}", root, e),
            (Ok(()), Err(e)) => tracing::warn!("Committed {} but cleanup failed: {}", root, e),
        }

        result?;
        cleanup
    }

    /// Discard the staged copy. The remote archive is never touched.
    pub async fn rollback(self) -> Result<(), TransactionError> {
        let Transaction {
            root,
            repo,
            staging,
            ..
        } = self;
        drop(repo);

        staging.remove().await?;
        tracing::debug!("Rolled back transaction on {}", root);
        Ok(())
    }
}

async fn upload(
    cancel: &CancellationToken,
    root: &RootHash,
    copier: &Copier,
    staging: &StagingDir,
) -> Result<(), TransactionError> {
    let repo_dir = staging.repository_path();
    let archive = staging.archive_path();
    tokio::task::spawn_blocking(move || siva::pack_dir(&repo_dir, &archive))
        .await
        .map_err(|e| TransactionError::TaskFailed(e.to_string()))??;

    let blob = root.siva_file_name();
    copier
        .copy_to_remote(cancel, &staging.archive_name(), &blob)
        .await
        .map_err(|source| TransactionError::Store { blob, source })
}
