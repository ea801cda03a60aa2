//! Fork-aware indexing pipeline
//!
//! Reads repository descriptors, processes each one on a bounded worker set
//! and writes one CSV record per repository. Repositories sharing roots are
//! coordinated through per-root keyed locks so a root archive is staged by
//! one worker at a time.

mod processor;

pub use processor::RepositoryProcessor;

use crate::analysis::Analyzers;
use crate::concurrency::{KeyedLocks, WorkerSet};
use crate::config::Config;
use crate::error::{ConfigError, IndexerError, RepositoryDataError};
use crate::output::{RecordWriter, set_forks};
use crate::source::{JsonlRepositoryStore, RepositoryQuery, RepositoryStore, load_repository_list};
use crate::stars::Stars;
use crate::storage::{Copier, backend_for_target};
use crate::transaction::{RootedTransactioner, SivaRootedTransactioner};
use crate::types::{RepositoryDescriptor, RepositoryRecord};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Records written between progress reports
const PROGRESS_INTERVAL: usize = 100;

/// Options of one indexing run
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub output: PathBuf,
    pub workers: usize,
    pub limit: usize,
    pub offset: usize,
    /// Only repositories with one of these endpoints, when not empty
    pub filter: Vec<String>,
    /// Buffer every record and fill FORK_COUNT before writing
    pub count_forks: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        let defaults = crate::config::IndexingConfig::default();
        Self {
            output: defaults.output,
            workers: defaults.workers,
            limit: 0,
            offset: 0,
            filter: Vec::new(),
            count_forks: false,
        }
    }
}

impl IndexOptions {
    /// Options from the `[indexing]` section, reading the repos file if set
    pub fn from_config(config: &Config) -> Result<Self, IndexerError> {
        let indexing = &config.indexing;
        let filter = match &indexing.repos_file {
            Some(path) => load_repository_list(path)?,
            None => Vec::new(),
        };

        Ok(Self {
            output: indexing.output.clone(),
            workers: indexing.workers,
            limit: indexing.limit,
            offset: indexing.offset,
            filter,
            count_forks: indexing.count_forks,
        })
    }
}

/// Outcome counts of an indexing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Records written, placeholders included
    pub processed: usize,
    /// Repositories that failed and produced no record
    pub failed: usize,
    /// Repositories never finished because of cancellation
    pub skipped: usize,
    /// Repositories selected for the run
    pub total: usize,
}

enum Outcome {
    Record(RepositoryRecord),
    Failed,
    Cancelled,
}

/// Indexer dependencies, built once and shared by every worker
pub struct Indexer {
    store: Arc<dyn RepositoryStore>,
    processor: RepositoryProcessor,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        transactioner: Arc<dyn RootedTransactioner>,
    ) -> Self {
        Self {
            store,
            processor: RepositoryProcessor {
                transactioner,
                analyzers: Analyzers::default(),
                locks: KeyedLocks::new(),
                stars: Arc::new(Stars::default()),
                checkout_dir: None,
            },
        }
    }

    pub fn with_analyzers(mut self, analyzers: Analyzers) -> Self {
        self.processor.analyzers = analyzers;
        self
    }

    pub fn with_stars(mut self, stars: Stars) -> Self {
        self.processor.stars = Arc::new(stars);
        self
    }

    /// Directory HEAD trees are checked out in, the system temp dir if unset
    pub fn with_checkout_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.processor.checkout_dir = Some(dir.into());
        self
    }

    /// Per-root locks shared by the workers
    pub fn locks(&self) -> &KeyedLocks {
        &self.processor.locks
    }

    /// Wire the backend, copier, transactioner, descriptor store and stars
    /// described by `config`
    pub async fn from_config(config: &Config) -> Result<Self, IndexerError> {
        let storage = &config.storage;

        if storage.clean_temp_dir {
            tracing::warn!("Cleaning temp dir {}", storage.temp_dir.display());
            match tokio::fs::remove_dir_all(&storage.temp_dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let backend = backend_for_target(
            &storage.root_repositories_target,
            storage.remote_temp_dir.as_deref().unwrap_or_default(),
        )?;
        let copier = Copier::new(storage.transactioner_dir(), backend, storage.bucket_size);
        let transactioner = SivaRootedTransactioner::new(Arc::new(copier))
            .with_cleanup_failed_begin(storage.cleanup_failed_begin);

        let repositories = config
            .indexing
            .repositories_file
            .as_ref()
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "indexing.repositories_file".to_string(),
                reason: "a repositories file is required".to_string(),
            })?;
        let store = JsonlRepositoryStore::open(repositories)?;

        let mut indexer = Self::new(Arc::new(store), Arc::new(transactioner))
            .with_checkout_dir(storage.checkout_dir());

        if let Some(path) = &config.indexing.stars_file {
            let list = match &config.indexing.repos_file {
                Some(repos) => load_repository_list(repos)?,
                None => Vec::new(),
            };
            indexer = indexer.with_stars(Stars::load(path, &list)?);
        }

        Ok(indexer)
    }

    /// Index the selected repositories into `opts.output`.
    ///
    /// Failing to create the output or to read the descriptor store aborts
    /// the run; a repository that fails is logged and counted. Cancelling
    /// `cancel` stops scheduling and interrupts in-flight copies.
    pub async fn index(
        &self,
        opts: IndexOptions,
        cancel: CancellationToken,
    ) -> Result<IndexSummary, IndexerError> {
        let start = Instant::now();
        let mut writer = RecordWriter::create(&opts.output)?;

        let query = RepositoryQuery {
            limit: opts.limit,
            offset: opts.offset,
            endpoints: opts.filter.clone(),
        };
        let total = self.store.count(&query).context("unable to count repositories")?;
        let repos = self.store.find(&query).context("unable to get repositories")?;

        tracing::info!(
            "Start processing {} repositories with {} workers",
            total,
            opts.workers
        );

        let workers = WorkerSet::new(opts.workers);
        let (tx, mut rx) = mpsc::channel(workers.max_workers());
        let producer = tokio::spawn(schedule(
            repos,
            self.processor.clone(),
            workers,
            tx,
            cancel.clone(),
        ));

        let mut summary = IndexSummary {
            total,
            ..Default::default()
        };
        let mut buffered = Vec::new();

        while let Some(outcome) = rx.recv().await {
            match outcome {
                Outcome::Record(record) if opts.count_forks => {
                    summary.processed += 1;
                    buffered.push(record);
                }
                Outcome::Record(record) => {
                    tracing::debug!("Writing record of {}", record.url);
                    writer.write(&record)?;
                    summary.processed += 1;
                    if summary.processed % PROGRESS_INTERVAL == 0 {
                        tracing::info!(
                            "Processed {}/{} repositories ({} failed)",
                            summary.processed,
                            total,
                            summary.failed
                        );
                    }
                }
                Outcome::Failed => summary.failed += 1,
                Outcome::Cancelled => {}
            }
        }

        if let Err(e) = producer.await {
            tracing::error!("Repository scheduler failed: {}", e);
        }

        if opts.count_forks {
            set_forks(&mut buffered);
            for record in &buffered {
                writer.write(record)?;
            }
        }

        summary.skipped = total.saturating_sub(summary.processed + summary.failed);
        if cancel.is_cancelled() {
            tracing::warn!("Indexing was interrupted, {} repositories skipped", summary.skipped);
        }

        tracing::info!(
            "Finished processing all repositories: processed={} failed={} skipped={} total={} elapsed={:?}",
            summary.processed,
            summary.failed,
            summary.skipped,
            summary.total,
            start.elapsed()
        );

        Ok(summary)
    }
}

/// Hand every repository to the worker set until done or cancelled
async fn schedule(
    repos: Vec<RepositoryDescriptor>,
    processor: RepositoryProcessor,
    workers: WorkerSet,
    tx: mpsc::Sender<Outcome>,
    cancel: CancellationToken,
) {
    for repo in repos {
        if cancel.is_cancelled() {
            break;
        }

        let processor = processor.clone();
        let tx = tx.clone();
        let task_cancel = cancel.clone();
        let task = async move {
            let outcome = process_one(&processor, &repo, &task_cancel).await;
            // The receiver only goes away when the run itself failed
            let _ = tx.send(outcome).await;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            spawned = workers.spawn(task) => {
                if spawned.is_err() {
                    break;
                }
            }
        }
    }

    workers.close();
    tracing::debug!("Finished scheduling repositories");
}

async fn process_one(
    processor: &RepositoryProcessor,
    repo: &RepositoryDescriptor,
    cancel: &CancellationToken,
) -> Outcome {
    tracing::debug!("Starting worker for repository {}", repo.id);

    match processor.process(repo, cancel).await {
        Ok(record) => Outcome::Record(record),
        Err(IndexerError::Repository(RepositoryDataError::NoHead(_))) => {
            tracing::warn!("Empty repository {}", repo.id);
            Outcome::Record(RepositoryRecord::placeholder(repo.url()))
        }
        Err(e) if e.is_cancelled() => {
            tracing::debug!("Processing of repository {} was cancelled", repo.id);
            Outcome::Cancelled
        }
        Err(e) => {
            tracing::error!("Unable to process repository {}: {}", repo.id, e);
            Outcome::Failed
        }
    }
}
