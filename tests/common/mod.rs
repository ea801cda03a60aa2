//! Shared fixtures: rooted stores built with git2 and packed as archives

#![allow(dead_code)]

use async_trait::async_trait;
use git2::{Commit, Oid, Repository, Signature};
use siva_indexer::error::BackendError;
use siva_indexer::storage::{Backend, BoxReader, BoxWriter, LocalBackend};
use siva_indexer::types::{HEAD_REFERENCE, Reference, RepositoryDescriptor};
use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;

pub const ROOT: &str = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef";

pub const MIT: &str = "MIT License\n\n\
    Permission is hereby granted, free of charge, to any person obtaining a copy.\n\
    The above copyright notice and this permission notice shall be included in all copies.\n\
    THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND.\n";

/// A bare repository standing for the store of one root
pub struct RootBuilder {
    dir: TempDir,
    repo: Repository,
}

impl RootBuilder {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        Self { dir, repo }
    }

    /// Create `count` linear commits; the last one holds `files`
    pub fn commit_chain(&self, count: usize, files: &[(&str, &str)]) -> Oid {
        let sig = Signature::now("tester", "tester@example.com").unwrap();
        let mut parent: Option<Oid> = None;

        for i in 0..count {
            let mut tree = self.repo.treebuilder(None).unwrap();
            if i + 1 == count {
                self.insert_files(&mut tree, files);
            } else {
                let step = self.repo.blob(format!("step {}\n", i).as_bytes()).unwrap();
                tree.insert("STEP", step, 0o100644).unwrap();
            }
            let tree = self.repo.find_tree(tree.write().unwrap()).unwrap();

            let parents: Vec<Commit> = parent
                .map(|p| self.repo.find_commit(p).unwrap())
                .into_iter()
                .collect();
            let parents: Vec<&Commit> = parents.iter().collect();
            let oid = self
                .repo
                .commit(None, &sig, &sig, &format!("commit {}", i), &tree, &parents)
                .unwrap();
            parent = Some(oid);
        }

        parent.unwrap()
    }

    fn insert_files(&self, root: &mut git2::TreeBuilder<'_>, files: &[(&str, &str)]) {
        let mut dirs: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
        for (path, content) in files {
            match path.split_once('/') {
                Some((dir, rest)) => dirs.entry(dir).or_default().push((rest, content)),
                None => {
                    let blob = self.repo.blob(content.as_bytes()).unwrap();
                    root.insert(path, blob, 0o100644).unwrap();
                }
            }
        }

        for (dir, files) in dirs {
            let mut sub = self.repo.treebuilder(None).unwrap();
            self.insert_files(&mut sub, &files);
            root.insert(dir, sub.write().unwrap(), 0o040000).unwrap();
        }
    }

    /// Register repository `id` at `url`, with HEAD and `branches` at `tip`
    pub fn add_repository(&self, id: &str, url: &str, tip: Oid, branches: &[&str]) {
        self.repo.remote(id, url).unwrap();
        self.repo
            .reference(&format!("{}/{}", HEAD_REFERENCE, id), tip, true, "head")
            .unwrap();
        for branch in branches {
            self.repo
                .reference(&format!("refs/heads/{}/{}", branch, id), tip, true, "branch")
                .unwrap();
        }
    }

    /// Pack into `<remote>/<root>.siva`
    pub fn pack(self, remote: &Path, root: &str) -> u64 {
        std::fs::create_dir_all(remote).unwrap();
        let archive = remote.join(format!("{}.siva", root));
        drop(self.repo);
        siva_indexer::siva::pack_dir(self.dir.path(), &archive).unwrap()
    }
}

pub fn descriptor(id: &str, url: &str, refs: &[(&str, &str)]) -> RepositoryDescriptor {
    RepositoryDescriptor {
        id: id.to_string(),
        endpoints: vec![url.to_string()],
        references: refs
            .iter()
            .map(|(name, init)| Reference {
                name: name.to_string(),
                init: init.parse().unwrap(),
            })
            .collect(),
    }
}

/// Local backend recording how many readers of each path are open at once
#[derive(Debug)]
pub struct InstrumentedBackend {
    inner: LocalBackend,
    state: Arc<Mutex<OpenState>>,
    delay: Duration,
    cancel_at: Option<(usize, CancellationToken)>,
}

#[derive(Debug, Default)]
pub struct OpenState {
    active: HashMap<String, usize>,
    max_active: HashMap<String, usize>,
    opens: HashMap<String, usize>,
    total_opens: usize,
}

impl InstrumentedBackend {
    pub fn new(base: &Path, delay: Duration) -> Self {
        Self {
            inner: LocalBackend::new(base.to_string_lossy()),
            state: Arc::default(),
            delay,
            cancel_at: None,
        }
    }

    /// Cancel `token` while serving the `nth` open, counted across all paths
    pub fn cancel_on_open(mut self, nth: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((nth, token));
        self
    }

    /// Highest number of simultaneously open readers of `path`
    pub fn max_concurrent_opens(&self, path: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.max_active.get(path).copied().unwrap_or(0)
    }

    pub fn opens(&self, path: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.opens.get(path).copied().unwrap_or(0)
    }
}

struct TrackedReader {
    inner: BoxReader,
    path: String,
    state: Arc<Mutex<OpenState>>,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        if let Some(active) = state.active.get_mut(&self.path) {
            *active -= 1;
        }
    }
}

#[async_trait]
impl Backend for InstrumentedBackend {
    async fn open(&self, path: &str) -> Result<BoxReader, BackendError> {
        let inner = self.inner.open(path).await?;
        {
            let mut state = self.state.lock().unwrap();
            *state.opens.entry(path.to_string()).or_default() += 1;
            let active = state.active.entry(path.to_string()).or_default();
            *active += 1;
            let now = *active;
            let max = state.max_active.entry(path.to_string()).or_default();
            *max = (*max).max(now);

            state.total_opens += 1;
            if let Some((nth, token)) = &self.cancel_at {
                if state.total_opens == *nth {
                    token.cancel();
                }
            }
        }

        let reader = TrackedReader {
            inner,
            path: path.to_string(),
            state: self.state.clone(),
        };
        // Keep the reader open long enough for a competing open to show up
        tokio::time::sleep(self.delay).await;
        Ok(Box::new(reader))
    }

    async fn write_to(&self, path: &str) -> Result<BoxWriter, BackendError> {
        self.inner.write_to(path).await
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<(), BackendError> {
        self.inner.rename(src, dst).await
    }

    async fn delete_if_exists(&self, path: &str) -> Result<(), BackendError> {
        self.inner.delete_if_exists(path).await
    }

    fn base(&self) -> &str {
        self.inner.base()
    }

    fn temp_dir(&self) -> &str {
        self.inner.temp_dir()
    }
}

/// Split one CSV line, honouring quoted fields
pub fn split_csv(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Rows of a result file keyed by URL, header excluded
pub fn read_rows(path: &Path) -> HashMap<String, Vec<String>> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(|line| {
            let row = split_csv(line);
            (row[0].clone(), row)
        })
        .collect()
}
