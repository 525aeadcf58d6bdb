use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Storage IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Content store for uploaded originals and their derivatives.
///
/// Paths are relative, `/`-separated, and never leave the store.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `bytes` under `directory` with a fresh unique name and return its path.
    async fn put(&self, directory: &str, bytes: &[u8], extension: &str) -> Result<String, StorageError>;

    /// Write `bytes` at exactly `path`, replacing whatever is there.
    async fn put_as(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;

    async fn get(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    async fn exists(&self, path: &str) -> bool;

    /// Remove `path`. A path that is already gone is not an error.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Public URL the presentation layer can link to.
    fn url(&self, path: &str) -> String;
}

/// Filesystem-backed store rooted at a single directory.
pub struct LocalDisk {
    root: PathBuf,
    url_prefix: String,
}

impl LocalDisk {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let clean = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn write_atomic(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        let io_err = |source| StorageError::Io {
            path: path.to_string(),
            source,
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        // Readers never observe a half-written file.
        let tmp = target.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(io_err(e));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalDisk {
    async fn put(&self, directory: &str, bytes: &[u8], extension: &str) -> Result<String, StorageError> {
        let directory = directory.trim_matches('/');
        let path = format!("{directory}/{}.{extension}", Uuid::new_v4());
        self.write_atomic(&path, bytes).await?;
        tracing::debug!(path = %path, size = bytes.len(), "Stored file");
        Ok(path)
    }

    async fn put_as(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.write_atomic(path, bytes).await
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target).await.map_err(|source| StorageError::Io {
            path: path.to_string(),
            source,
        })
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(target) => tokio::fs::try_exists(&target).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.url_prefix, path)
    }
}
