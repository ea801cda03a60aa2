use crate::error::RepositoryDataError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Name of the descriptor reference pointing at a repository's HEAD
pub const HEAD_REFERENCE: &str = "refs/heads/HEAD";

/// Extension of packed root archives
pub const SIVA_EXTENSION: &str = "siva";

/// Content id of a root (initial) commit: 40 lowercase hex characters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RootHash(String);

impl RootHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the archive holding this root: `<hash>.siva`
    pub fn siva_file_name(&self) -> String {
        format!("{}.{}", self.0, SIVA_EXTENSION)
    }
}

impl FromStr for RootHash {
    type Err = RepositoryDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 40 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(RepositoryDataError::InvalidRootHash(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for RootHash {
    type Error = RepositoryDataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RootHash> for String {
    fn from(hash: RootHash) -> Self {
        hash.0
    }
}

impl fmt::Display for RootHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference of a repository and the root its history starts from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Reference name, e.g. `refs/heads/master`
    pub name: String,
    /// Root commit reachable from this reference
    pub init: RootHash,
}

/// One repository to index, as produced by the crawler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    /// Stable identifier used for ordering and logging
    pub id: String,
    /// Clone URLs of the repository
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// References and their roots
    #[serde(default)]
    pub references: Vec<Reference>,
}

impl RepositoryDescriptor {
    /// Root of the HEAD reference, if the repository has one
    pub fn head_root(&self) -> Option<&RootHash> {
        self.references
            .iter()
            .rev()
            .find(|r| r.name == HEAD_REFERENCE)
            .map(|r| &r.init)
    }

    /// Distinct roots reachable from any reference, sorted
    pub fn roots(&self) -> Vec<RootHash> {
        let mut roots: Vec<RootHash> = self.references.iter().map(|r| r.init.clone()).collect();
        roots.sort();
        roots.dedup();
        roots
    }

    /// Preferred URL: the first GitHub endpoint, else the first endpoint
    pub fn url(&self) -> String {
        self.endpoints
            .iter()
            .find(|e| e.contains("github.com"))
            .or_else(|| self.endpoints.first())
            .cloned()
            .unwrap_or_default()
    }
}

/// Per-language usage in the HEAD tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageUsage {
    pub files: u64,
    pub bytes: u64,
    pub lines: u64,
}

/// Per-language line breakdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCounts {
    pub blank: u64,
    pub code: u64,
    pub comments: u64,
}

/// Usage and line counts of one language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageStats {
    pub usage: LanguageUsage,
    pub lines: LineCounts,
}

/// Merge usage with line counts; languages without usage are dropped
pub fn merge_language_data(
    usage: BTreeMap<String, LanguageUsage>,
    mut counts: BTreeMap<String, LineCounts>,
) -> BTreeMap<String, LanguageStats> {
    usage
        .into_iter()
        .map(|(lang, usage)| {
            let lines = counts.remove(&lang).unwrap_or_default();
            (lang, LanguageStats { usage, lines })
        })
        .collect()
}

/// Output columns, in order
pub const RECORD_HEADER: [&str; 16] = [
    "URL",
    "SIVA_FILENAMES",
    "FILE_COUNT",
    "LANGS",
    "LANGS_BYTE_COUNT",
    "LANGS_LINES_COUNT",
    "LANGS_FILES_COUNT",
    "COMMITS_COUNT",
    "BRANCHES_COUNT",
    "FORK_COUNT",
    "EMPTY_LINES_COUNT",
    "CODE_LINES_COUNT",
    "COMMENT_LINES_COUNT",
    "LICENSE",
    "STARS",
    "SIZE",
];

/// Aggregated statistics of one repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub url: String,
    /// Archive names of every root, sorted
    pub siva_files: Vec<String>,
    /// Sum of the distinct roots' archive sizes in bytes
    pub size: u64,
    /// Files in the HEAD tree
    pub files: usize,
    pub languages: BTreeMap<String, LanguageStats>,
    /// Commits reachable from HEAD
    pub head_commits: u64,
    /// Commits of all distinct roots
    pub commits: u64,
    /// References carrying this repository's identifier, over all roots
    pub branches: usize,
    pub forks: usize,
    pub license: BTreeMap<String, f32>,
    pub stars: u32,
}

impl RepositoryRecord {
    /// Record emitted for a repository without HEAD
    pub fn placeholder(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Render the record as output columns matching [`RECORD_HEADER`]
    pub fn to_row(&self) -> Vec<String> {
        let licenses = join(
            self.license
                .iter()
                .map(|(name, confidence)| format!("{}:{:.3}", name, confidence)),
        );

        vec![
            self.url.clone(),
            self.siva_files.join(","),
            self.files.to_string(),
            join(self.languages.keys().cloned()),
            self.language_column(|l| l.usage.bytes),
            self.language_column(|l| l.usage.lines),
            self.language_column(|l| l.usage.files),
            self.commits.to_string(),
            self.branches.to_string(),
            self.forks.to_string(),
            self.language_column(|l| l.lines.blank),
            self.language_column(|l| l.lines.code),
            self.language_column(|l| l.lines.comments),
            licenses,
            self.stars.to_string(),
            self.size.to_string(),
        ]
    }

    fn language_column(&self, value: impl Fn(&LanguageStats) -> u64) -> String {
        join(self.languages.values().map(|l| value(l).to_string()))
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(",")
}
