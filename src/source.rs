//! Repository descriptors to index
//!
//! The crawler's database is abstracted as a [`RepositoryStore`]; the stock
//! implementation reads one JSON descriptor per line.

use crate::types::RepositoryDescriptor;
use anyhow::{Context, Result};
use std::path::Path;

/// Which descriptors to index
#[derive(Debug, Clone, Default)]
pub struct RepositoryQuery {
    /// Maximum number of descriptors, 0 for no limit
    pub limit: usize,
    /// Descriptors to skip first
    pub offset: usize,
    /// Only descriptors with at least one of these endpoints, when not empty
    pub endpoints: Vec<String>,
}

impl RepositoryQuery {
    pub fn matches(&self, repo: &RepositoryDescriptor) -> bool {
        self.endpoints.is_empty() || repo.endpoints.iter().any(|e| self.endpoints.contains(e))
    }

    /// Apply the filter, then offset and limit, to descriptors in id order
    fn select<'a>(
        &'a self,
        repos: impl Iterator<Item = &'a RepositoryDescriptor> + 'a,
    ) -> impl Iterator<Item = &'a RepositoryDescriptor> + 'a {
        let limit = if self.limit == 0 { usize::MAX } else { self.limit };
        repos
            .filter(move |r| self.matches(r))
            .skip(self.offset)
            .take(limit)
    }
}

/// Source of repository descriptors
pub trait RepositoryStore: Send + Sync {
    /// Number of descriptors `find` would return
    fn count(&self, query: &RepositoryQuery) -> Result<usize>;

    /// Matching descriptors, ordered by id
    fn find(&self, query: &RepositoryQuery) -> Result<Vec<RepositoryDescriptor>>;
}

/// In-memory store, kept sorted by id
#[derive(Debug, Clone, Default)]
pub struct MemoryRepositoryStore {
    repos: Vec<RepositoryDescriptor>,
}

impl MemoryRepositoryStore {
    pub fn new(mut repos: Vec<RepositoryDescriptor>) -> Self {
        repos.sort_by(|a, b| a.id.cmp(&b.id));
        Self { repos }
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}

impl RepositoryStore for MemoryRepositoryStore {
    fn count(&self, query: &RepositoryQuery) -> Result<usize> {
        Ok(query.select(self.repos.iter()).count())
    }

    fn find(&self, query: &RepositoryQuery) -> Result<Vec<RepositoryDescriptor>> {
        Ok(query.select(self.repos.iter()).cloned().collect())
    }
}

/// Descriptors read from a JSON lines file
pub struct JsonlRepositoryStore;

impl JsonlRepositoryStore {
    /// Parse every non-empty line of `path` as a [`RepositoryDescriptor`]
    pub fn open(path: &Path) -> Result<MemoryRepositoryStore> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read repositories file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid repositories file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<MemoryRepositoryStore> {
        let repos = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<RepositoryDescriptor>(line)
                    .with_context(|| format!("line {}", n + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Loaded {} repository descriptors", repos.len());
        Ok(MemoryRepositoryStore::new(repos))
    }
}

/// Read a list of repository URLs, one per line
pub fn load_repository_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to read repository list {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}
