use crate::analysis::{Analyzers, materialize};
use crate::concurrency::KeyedLocks;
use crate::error::{IndexerError, RepositoryDataError, TransactionError};
use crate::git::RepoWalker;
use crate::stars::Stars;
use crate::transaction::{RootedTransactioner, Transaction};
use crate::types::{RepositoryDescriptor, RepositoryRecord, RootHash, merge_language_data};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Builds the record of one repository.
///
/// Every transaction runs while holding the keyed lock of its root, so
/// forks sharing a root never stage it concurrently. Transactions are always
/// rolled back: indexing never mutates a store.
#[derive(Clone)]
pub struct RepositoryProcessor {
    pub(crate) transactioner: Arc<dyn RootedTransactioner>,
    pub(crate) analyzers: Analyzers,
    pub(crate) locks: KeyedLocks,
    pub(crate) stars: Arc<Stars>,
    pub(crate) checkout_dir: Option<PathBuf>,
}

/// What the HEAD transaction yields
struct HeadData {
    record: RepositoryRecord,
    id: String,
}

/// What one root transaction yields
struct RootCounts {
    commits: u64,
    branches: usize,
}

impl RepositoryProcessor {
    pub async fn process(
        &self,
        repo: &RepositoryDescriptor,
        cancel: &CancellationToken,
    ) -> Result<RepositoryRecord, IndexerError> {
        let start = Instant::now();
        tracing::debug!("Start processing repository {}", repo.id);

        let head = repo
            .head_root()
            .cloned()
            .ok_or_else(|| RepositoryDataError::NoHead(repo.id.clone()))?;

        let HeadData { mut record, id } = self.head_data(repo, &head, cancel).await?;

        let roots = repo.roots();
        for root in &roots {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }

            tracing::debug!("Processing root {} of {}", root, record.url);
            let (counts, size) = self.root_counts(root, &id, cancel).await?;
            record.commits += counts.commits;
            record.branches += counts.branches;
            record.size += size;
        }

        record.siva_files = roots.iter().map(RootHash::siva_file_name).collect();
        record.stars = self.stars.for_url(&record.url);

        tracing::debug!(
            "Finished processing repository {} in {:?}",
            repo.id,
            start.elapsed()
        );
        Ok(record)
    }

    async fn head_data(
        &self,
        repo: &RepositoryDescriptor,
        head: &RootHash,
        cancel: &CancellationToken,
    ) -> Result<HeadData, IndexerError> {
        let _guard = self.locks.lock(head.as_str()).await;
        let tx = self.transactioner.begin(cancel, head).await?;

        let repo = repo.clone();
        let analyzers = self.analyzers.clone();
        let checkout_dir = self.checkout_dir.clone();
        let (tx, data) = run_blocking(tx, move |tx| {
            extract_head_data(tx, &repo, &analyzers, checkout_dir)
        })
        .await?;
        rollback(tx).await;

        data.map_err(|e| IndexerError::other(format!("unable to get repo data: {:#}", e)))
    }

    async fn root_counts(
        &self,
        root: &RootHash,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<(RootCounts, u64), IndexerError> {
        let _guard = self.locks.lock(root.as_str()).await;
        let tx = self.transactioner.begin(cancel, root).await?;

        let id = id.to_string();
        let (tx, counts) = run_blocking(tx, move |tx| count_root(tx, &id)).await?;
        let size = tx.archive_size();
        rollback(tx).await;

        let counts = counts
            .map_err(|e| IndexerError::other(format!("can't process root {}: {:#}", root, e)))?;
        Ok((counts, size))
    }
}

/// Run git work on a blocking thread, handing the transaction back
async fn run_blocking<T, F>(tx: Transaction, work: F) -> Result<(Transaction, T), IndexerError>
where
    T: Send + 'static,
    F: FnOnce(&Transaction) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let out = work(&tx);
        (tx, out)
    })
    .await
    .map_err(|e| TransactionError::TaskFailed(e.to_string()).into())
}

async fn rollback(tx: Transaction) {
    let root = tx.root().clone();
    if let Err(e) = tx.rollback().await {
        tracing::warn!("Unable to roll back transaction on {}: {}", root, e);
    }
}

fn extract_head_data(
    tx: &Transaction,
    repo: &RepositoryDescriptor,
    analyzers: &Analyzers,
    checkout_dir: Option<PathBuf>,
) -> Result<HeadData> {
    let walker = RepoWalker::new(tx.storer());
    let id = walker.repository_id(&repo.id, &repo.endpoints)?;
    let head = walker.head(&id).context("unable to get HEAD ref")?;

    let files = walker.head_files(head).context("unable to get head files")?;
    let usage = analyzers.languages.detect_languages(&files);

    if let Some(dir) = &checkout_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("unable to create {}", dir.display()))?;
    }
    let checkout = materialize(&files, checkout_dir.as_deref())
        .context("unable to write files to temp dir")?;

    let lines = analyzers
        .lines
        .count_lines(checkout.path(), &files)
        .context("can't analyze files")?;
    let head_commits = walker
        .count_history(head)
        .context("unable to get head commits")?;

    let url = repo.url();
    let license = analyzers
        .license
        .detect_license(checkout.path())
        .unwrap_or_else(|e| {
            tracing::warn!("Unable to get license for repository {}: {:#}", url, e);
            BTreeMap::new()
        });

    Ok(HeadData {
        record: RepositoryRecord {
            files: files.len(),
            languages: merge_language_data(usage, lines),
            head_commits,
            license,
            ..RepositoryRecord::placeholder(url)
        },
        id,
    })
}

fn count_root(tx: &Transaction, id: &str) -> Result<RootCounts> {
    let walker = RepoWalker::new(tx.storer());
    let commits = walker.count_commits().context("can't count root commits")?;
    let branches = walker.count_references(id).context("unable to count refs")?;
    Ok(RootCounts { commits, branches })
}
