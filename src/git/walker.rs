use crate::analysis::HeadFile;
use crate::error::RepositoryDataError;
use crate::types::HEAD_REFERENCE;
use anyhow::{Context, Result};
use git2::{ConfigLevel, ObjectType, Oid, Repository, Sort, TreeWalkMode, TreeWalkResult};
use std::collections::HashSet;

/// Read-only statistics over one rooted repository store.
///
/// A rooted store holds the history of every repository sharing the root,
/// so references are namespaced with a per-repository suffix:
/// `refs/heads/master/<id>`, where `<id>` is also the name of the remote
/// carrying that repository's URL.
pub struct RepoWalker<'r> {
    repo: &'r Repository,
}

impl<'r> RepoWalker<'r> {
    pub fn new(repo: &'r Repository) -> Self {
        Self { repo }
    }

    /// Find the per-root identifier of the repository reachable at one of
    /// `endpoints`, by matching them against the store's remote URLs
    pub fn repository_id(&self, repo_id: &str, endpoints: &[String]) -> Result<String> {
        let config = self
            .repo
            .config()
            .and_then(|c| c.open_level(ConfigLevel::Local))
            .context("Failed to read repository config")?;

        let mut entries = config
            .entries(Some(r"remote\..*\.url"))
            .context("Failed to list configured remotes")?;

        while let Some(entry) = entries.next() {
            let entry = entry?;
            let (Some(name), Some(url)) = (entry.name(), entry.value()) else {
                continue;
            };

            if !endpoints.iter().any(|e| e == url) {
                continue;
            }

            if let Some(id) = name
                .strip_prefix("remote.")
                .and_then(|n| n.strip_suffix(".url"))
            {
                return Ok(id.to_string());
            }
        }

        Err(RepositoryDataError::UnresolvedIdentity(repo_id.to_string()).into())
    }

    /// Resolve `refs/heads/HEAD/<id>` to the commit it points at
    pub fn head(&self, id: &str) -> Result<Oid> {
        let name = format!("{}/{}", HEAD_REFERENCE, id);
        let reference = self
            .repo
            .find_reference(&name)
            .with_context(|| format!("Failed to find HEAD reference {}", name))?
            .resolve()
            .with_context(|| format!("Failed to resolve {}", name))?;

        reference
            .target()
            .with_context(|| format!("Reference {} has no target", name))
    }

    /// Every blob of the tree of `head`, with its path and content
    pub fn head_files(&self, head: Oid) -> Result<Vec<HeadFile>> {
        let commit = self
            .repo
            .find_commit(head)
            .with_context(|| format!("Can't get HEAD commit {}", head))?;
        let tree = commit.tree().context("Can't get HEAD tree")?;

        let mut blobs = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(ObjectType::Blob)
                && let Some(name) = entry.name()
            {
                blobs.push((format!("{}{}", dir, name), entry.id()));
            }
            TreeWalkResult::Ok
        })
        .context("Can't walk HEAD tree")?;

        blobs
            .into_iter()
            .map(|(path, oid)| {
                let blob = self
                    .repo
                    .find_blob(oid)
                    .with_context(|| format!("Can't read file {}", path))?;
                Ok(HeadFile {
                    path,
                    content: blob.content().to_vec(),
                })
            })
            .collect()
    }

    /// Commits reachable from `head`
    pub fn count_history(&self, head: Oid) -> Result<u64> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::NONE)?;
        revwalk
            .push(head)
            .with_context(|| format!("Can't walk history of {}", head))?;

        let mut count = 0;
        for oid in revwalk {
            oid?;
            count += 1;
        }
        Ok(count)
    }

    /// Commit objects stored in the repository, whatever references them
    pub fn count_commits(&self) -> Result<u64> {
        let odb = self.repo.odb().context("Can't open object database")?;

        let mut commits = HashSet::new();
        let mut failure = None;
        odb.foreach(|oid| match odb.read_header(*oid) {
            Ok((_, ObjectType::Commit)) => {
                commits.insert(*oid);
                true
            }
            Ok(_) => true,
            Err(e) => {
                failure = Some(e);
                false
            }
        })
        .or_else(|e| match failure.take() {
            Some(inner) => Err(inner),
            None => Err(e),
        })
        .context("Can't enumerate root commits")?;

        Ok(commits.len() as u64)
    }

    /// References whose name ends with `/<id>`
    pub fn count_references(&self, id: &str) -> Result<usize> {
        let suffix = format!("/{}", id);
        let mut count = 0;
        for reference in self.repo.references().context("Can't get references")? {
            let reference = reference?;
            if reference.name_bytes().ends_with(suffix.as_bytes()) {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Commit, Signature};
    use tempfile::TempDir;

    fn bare_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        (dir, repo)
    }

    fn commit(repo: &Repository, files: &[(&str, &str)], parent: Option<Oid>) -> Oid {
        let sig = Signature::now("tester", "tester@example.com").unwrap();
        let mut root = repo.treebuilder(None).unwrap();
        let mut nested = repo.treebuilder(None).unwrap();
        for (path, content) in files {
            let blob = repo.blob(content.as_bytes()).unwrap();
            match path.split_once('/') {
                Some((_, name)) => nested.insert(name, blob, 0o100644).unwrap(),
                None => root.insert(path, blob, 0o100644).unwrap(),
            };
        }
        if !nested.is_empty() {
            root.insert("src", nested.write().unwrap(), 0o040000).unwrap();
        }
        let tree = repo.find_tree(root.write().unwrap()).unwrap();
        let parents: Vec<Commit> = parent
            .map(|p| repo.find_commit(p).unwrap())
            .into_iter()
            .collect();
        let parents: Vec<&Commit> = parents.iter().collect();
        repo.commit(None, &sig, &sig, "commit", &tree, &parents).unwrap()
    }

    #[test]
    fn test_repository_id_matches_remote_url() {
        let (_dir, repo) = bare_repo();
        repo.remote("17", "https://github.com/a/b").unwrap();
        repo.remote("42", "git://github.com/c/d.git").unwrap();

        let walker = RepoWalker::new(&repo);
        let endpoints = vec!["git://github.com/c/d.git".to_string()];
        assert_eq!(walker.repository_id("x", &endpoints).unwrap(), "42");
    }

    #[test]
    fn test_repository_id_unresolved() {
        let (_dir, repo) = bare_repo();
        repo.remote("17", "https://github.com/a/b").unwrap();

        let walker = RepoWalker::new(&repo);
        let err = walker
            .repository_id("repo-9", &["https://example.com/x".to_string()])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RepositoryDataError>(),
            Some(RepositoryDataError::UnresolvedIdentity(id)) if id == "repo-9"
        ));
    }

    #[test]
    fn test_head_files_and_history() {
        let (_dir, repo) = bare_repo();
        let first = commit(&repo, &[("README.md", "hello\n")], None);
        let second = commit(
            &repo,
            &[("README.md", "hello\nworld\n"), ("src/main.rs", "fn main() {}\n")],
            Some(first),
        );
        repo.reference("refs/heads/HEAD/7", second, true, "head").unwrap();

        let walker = RepoWalker::new(&repo);
        let head = walker.head("7").unwrap();
        assert_eq!(head, second);

        let mut files = walker.head_files(head).unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/main.rs"]);
        assert_eq!(files[0].content, b"hello\nworld\n");

        assert_eq!(walker.count_history(head).unwrap(), 2);
    }

    #[test]
    fn test_missing_head_reference() {
        let (_dir, repo) = bare_repo();
        assert!(RepoWalker::new(&repo).head("7").is_err());
    }

    #[test]
    fn test_count_commits_includes_unreferenced() {
        let (_dir, repo) = bare_repo();
        let first = commit(&repo, &[("a", "1")], None);
        let second = commit(&repo, &[("a", "2")], Some(first));
        commit(&repo, &[("a", "3")], Some(second));
        repo.reference("refs/heads/master/1", second, true, "m").unwrap();

        assert_eq!(RepoWalker::new(&repo).count_commits().unwrap(), 3);
    }

    #[test]
    fn test_count_references_by_suffix() {
        let (_dir, repo) = bare_repo();
        let oid = commit(&repo, &[("a", "1")], None);
        for name in [
            "refs/heads/HEAD/1",
            "refs/heads/master/1",
            "refs/heads/master/11",
            "refs/heads/master/2",
        ] {
            repo.reference(name, oid, true, "ref").unwrap();
        }

        let walker = RepoWalker::new(&repo);
        assert_eq!(walker.count_references("1").unwrap(), 2);
        assert_eq!(walker.count_references("2").unwrap(), 1);
        assert_eq!(walker.count_references("3").unwrap(), 0);
    }
}
