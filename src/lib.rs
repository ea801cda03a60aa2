//! # siva-indexer - fork-aware statistics over rooted repositories
//!
//! Extracts per-repository statistics (languages, line counts, commit and
//! branch counts, license, size) from git repositories packed as siva
//! archives in a local or remote store.
//!
//! ## Overview
//!
//! Forks share history, so repositories are stored by *root*: every root
//! commit hash has one `<hash>.siva` archive holding the objects and
//! references of every repository reachable from it. References are
//! namespaced per repository (`refs/heads/master/<id>`), which lets the
//! indexer attribute branches to the right fork even though forks share the
//! same archive.
//!
//! ## Architecture
//!
//! ```text
//! descriptors ──► WorkerSet ──► RepositoryProcessor ──► RecordWriter (CSV)
//!                                 │ per root: KeyedLocks
//!                                 ▼
//!                       RootedTransactioner (staging + git2)
//!                                 │
//!                               Copier (.copy + rename)
//!                                 │
//!                       Backend (local dir | object store)
//! ```
//!
//! ## Modules
//!
//! - [`storage`]: backends, bucketing and the atomic copier
//! - [`siva`]: archive codec used to stage rooted repositories
//! - [`transaction`]: begin/commit/rollback on one root archive
//! - [`concurrency`]: keyed locks and the bounded worker set
//! - [`git`]: identity, HEAD files and counts of a rooted store
//! - [`analysis`]: language, line and license collaborators
//! - [`indexer`]: the pipeline tying everything together
//! - [`source`], [`stars`], [`output`]: inputs and the record writer
//! - [`config`], [`paths`], [`error`], [`types`]: ambient plumbing
//!
//! ## Usage Example
//!
//! ```no_run
//! use siva_indexer::config::Config;
//! use siva_indexer::indexer::{IndexOptions, Indexer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new()?;
//!     let indexer = Indexer::from_config(&config).await?;
//!     let summary = indexer
//!         .index(IndexOptions::from_config(&config)?, CancellationToken::new())
//!         .await?;
//!     println!("{} repositories indexed", summary.processed);
//!     Ok(())
//! }
//! ```

/// HEAD tree analysis: languages, line counts, licenses
pub mod analysis;

/// Keyed locks and bounded worker set
pub mod concurrency;

/// Configuration management with environment variable overrides
pub mod config;

/// Error types and utilities
pub mod error;

/// Git inspection of rooted repository stores
pub mod git;

/// Fork-aware indexing pipeline
pub mod indexer;

/// CSV record output and fork counting
pub mod output;

/// Platform default paths
pub mod paths;

/// Siva archive packing and unpacking
pub mod siva;

/// Repository descriptor sources
pub mod source;

/// Star counts per repository
pub mod stars;

/// Storage backends and the atomic copier
pub mod storage;

/// Transactions on rooted repositories
pub mod transaction;

/// Root hashes, descriptors and records
pub mod types;
