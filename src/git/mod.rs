//! Git inspection of rooted repository stores
//!
//! Resolves a repository's identity inside a store shared by its forks and
//! extracts HEAD files, commit counts and per-repository branch counts.

/// Statistics over one rooted repository store
pub mod walker;

pub use walker::RepoWalker;
