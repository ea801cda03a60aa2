use super::{Backend, BoxReader, BoxWriter};
use crate::error::BackendError;
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use object_store::{ObjectStore, parse_url};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::io::StreamReader;
use url::Url;

/// Error messages that mean the store is temporarily unavailable and the
/// client connection must be rebuilt.
const TRANSIENT_ERRORS: &[&str] = &[
    "no available namenodes",
    "org.apache.hadoop.hdfs.server.namenode.SafeModeException",
];

/// Builds a store client for a URL
pub type Connector =
    Arc<dyn Fn(&Url) -> Result<Arc<dyn ObjectStore>, object_store::Error> + Send + Sync>;

fn default_connector() -> Connector {
    Arc::new(|url: &Url| -> Result<Arc<dyn ObjectStore>, object_store::Error> {
        let (store, _) = parse_url(url)?;
        Ok(Arc::from(store))
    })
}

/// Backend over a remote blob store reachable through `object_store`.
///
/// The client is created lazily and cached. Errors from the transient set
/// drop the cached client so the next call reconnects.
pub struct RemoteBackend {
    url: Url,
    base: String,
    temp_dir: String,
    connector: Connector,
    client: Mutex<Option<Arc<dyn ObjectStore>>>,
}

impl fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("url", &self.url.as_str())
            .field("base", &self.base)
            .field("temp_dir", &self.temp_dir)
            .finish()
    }
}

impl RemoteBackend {
    /// Create a backend for `url`. `temp_dir` defaults to the base path when empty.
    pub fn new(url: Url, temp_dir: &str) -> Result<Self, BackendError> {
        Self::with_connector(url, temp_dir, default_connector())
    }

    /// Create a backend with a custom client factory
    pub fn with_connector(
        url: Url,
        temp_dir: &str,
        connector: Connector,
    ) -> Result<Self, BackendError> {
        let base = Path::from_url_path(url.path())
            .map_err(|e| BackendError::InvalidTarget {
                target: url.to_string(),
                reason: e.to_string(),
            })?
            .to_string();
        let temp_dir = if temp_dir.is_empty() {
            base.clone()
        } else {
            temp_dir.trim_matches('/').to_string()
        };

        Ok(Self {
            url,
            base,
            temp_dir,
            connector,
            client: Mutex::new(None),
        })
    }

    fn cached(&self) -> MutexGuard<'_, Option<Arc<dyn ObjectStore>>> {
        self.client.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn has_client(&self) -> bool {
        self.cached().is_some()
    }

    fn client(&self) -> Result<Arc<dyn ObjectStore>, BackendError> {
        let mut cached = self.cached();
        if let Some(client) = cached.as_ref() {
            return Ok(client.clone());
        }

        tracing::debug!("Connecting to remote store at {}", self.url);
        let client = match (self.connector)(&self.url) {
            Ok(client) => client,
            Err(e) => {
                // free_client takes the lock again
                drop(cached);
                return Err(self.free_client(e));
            }
        };
        *cached = Some(client.clone());
        Ok(client)
    }

    /// Classify a store error, discarding the cached client on transient ones
    fn free_client(&self, err: object_store::Error) -> BackendError {
        if let object_store::Error::NotFound { path, .. } = &err {
            return BackendError::NotFound(path.clone());
        }

        let message = err.to_string();
        if TRANSIENT_ERRORS.iter().any(|t| message.contains(t)) {
            tracing::warn!("Transient remote store error, dropping client: {}", message);
            *self.cached() = None;
            return BackendError::Transient(message);
        }

        BackendError::Store(message)
    }

    fn location(&self, path: &str) -> Result<Path, BackendError> {
        Path::parse(path.trim_start_matches('/')).map_err(|e| BackendError::InvalidTarget {
            target: path.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn open(&self, path: &str) -> Result<BoxReader, BackendError> {
        let location = self.location(path)?;
        let client = self.client()?;
        let result = client
            .get(&location)
            .await
            .map_err(|e| self.free_client(e))?;

        let stream = result.into_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }

    async fn write_to(&self, path: &str) -> Result<BoxWriter, BackendError> {
        let location = self.location(path)?;
        let client = self.client()?;
        self.delete_if_exists(path).await?;
        Ok(Box::new(BufWriter::new(client, location)))
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<(), BackendError> {
        let from = self.location(src)?;
        let to = self.location(dst)?;
        let client = self.client()?;
        client
            .rename(&from, &to)
            .await
            .map_err(|e| self.free_client(e))
    }

    async fn delete_if_exists(&self, path: &str) -> Result<(), BackendError> {
        let location = self.location(path)?;
        let client = self.client()?;
        match client.delete(&location).await {
            Ok(()) => Ok(()),
            Err(e) => match self.free_client(e) {
                BackendError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    fn base(&self) -> &str {
        &self.base
    }

    fn temp_dir(&self) -> &str {
        &self.temp_dir
    }
}
