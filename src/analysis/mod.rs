//! Content analysis of a repository's HEAD tree
//!
//! The indexing pipeline treats these collaborators as opaque: it hands them
//! the HEAD files (and a directory where those files were materialized) and
//! stores whatever they report in the repository record.

/// Language detection by file extension
pub mod language;
/// Keyword based license detection
pub mod license;
/// Blank/code/comment line counting
pub mod lines;

pub use language::ExtensionLanguageDetector;
pub use license::KeywordLicenseDetector;
pub use lines::CommentAwareLineCounter;

use crate::types::{LanguageUsage, LineCounts};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A file of the HEAD tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadFile {
    /// Slash separated path relative to the tree root
    pub path: String,
    pub content: Vec<u8>,
}

/// Reports files, bytes and lines per language
pub trait LanguageDetector: Send + Sync {
    fn detect_languages(&self, files: &[HeadFile]) -> BTreeMap<String, LanguageUsage>;
}

/// Reports blank, code and comment lines per language for files under `dir`
pub trait LineCounter: Send + Sync {
    fn count_lines(&self, dir: &Path, files: &[HeadFile]) -> Result<BTreeMap<String, LineCounts>>;
}

/// Reports license name to confidence for the project checked out at `dir`
pub trait LicenseDetector: Send + Sync {
    fn detect_license(&self, dir: &Path) -> Result<BTreeMap<String, f32>>;
}

/// The collaborators used for each HEAD
#[derive(Clone)]
pub struct Analyzers {
    pub languages: Arc<dyn LanguageDetector>,
    pub lines: Arc<dyn LineCounter>,
    pub license: Arc<dyn LicenseDetector>,
}

impl Default for Analyzers {
    fn default() -> Self {
        Self {
            languages: Arc::new(ExtensionLanguageDetector),
            lines: Arc::new(CommentAwareLineCounter),
            license: Arc::new(KeywordLicenseDetector::new()),
        }
    }
}

/// Write the HEAD files into a fresh temporary directory.
///
/// The directory is removed when the returned guard drops.
pub fn materialize(files: &[HeadFile], temp_root: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("siva-indexer");
    let dir = match temp_root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .context("Unable to create temp dir")?;

    for file in files {
        let path = dir.path().join(&file.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Unable to create {}", parent.display()))?;
        }
        std::fs::write(&path, &file.content)
            .with_context(|| format!("Unable to write {}", path.display()))?;
    }

    Ok(dir)
}
