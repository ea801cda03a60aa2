use super::{Backend, BoxReader, BoxWriter};
use crate::error::BackendError;
use async_trait::async_trait;
use std::path::Path;

/// Thin pass-through to the local filesystem.
///
/// Paths given to the backend are used verbatim; [`Backend::base`] is the
/// directory the copier joins blob names onto.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    base: String,
    temp_dir: String,
}

impl LocalBackend {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            temp_dir: std::env::temp_dir().to_string_lossy().into_owned(),
        }
    }

    async fn ensure_parent(path: &str) -> Result<(), BackendError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::io(parent.to_string_lossy(), e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn open(&self, path: &str) -> Result<BoxReader, BackendError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| BackendError::io(path, e))?;
        Ok(Box::new(file))
    }

    async fn write_to(&self, path: &str) -> Result<BoxWriter, BackendError> {
        Self::ensure_parent(path).await?;
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| BackendError::io(path, e))?;
        Ok(Box::new(file))
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<(), BackendError> {
        Self::ensure_parent(dst).await?;
        tokio::fs::rename(src, dst)
            .await
            .map_err(|e| BackendError::io(src, e))
    }

    async fn delete_if_exists(&self, path: &str) -> Result<(), BackendError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError::io(path, e)),
        }
    }

    fn base(&self) -> &str {
        &self.base
    }

    fn temp_dir(&self) -> &str {
        &self.temp_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_write_rename_open() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path().to_string_lossy());
        let tmp = dir.path().join("nested/a.copy");
        let dst = dir.path().join("nested/deeper/a");

        let mut w = backend.write_to(&tmp.to_string_lossy()).await.unwrap();
        w.write_all(b"hello").await.unwrap();
        w.shutdown().await.unwrap();

        backend
            .rename(&tmp.to_string_lossy(), &dst.to_string_lossy())
            .await
            .unwrap();
        assert!(!tmp.exists());

        let mut r = backend.open(&dst.to_string_lossy()).await.unwrap();
        let mut content = String::new();
        r.read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path().to_string_lossy());
        let missing = dir.path().join("missing.siva");
        let err = backend.open(&missing.to_string_lossy()).await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_if_exists() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path().to_string_lossy());
        let path = dir.path().join("x");
        std::fs::write(&path, b"x").unwrap();

        backend.delete_if_exists(&path.to_string_lossy()).await.unwrap();
        assert!(!path.exists());
        // Second delete is a no-op
        backend.delete_if_exists(&path.to_string_lossy()).await.unwrap();
    }
}
