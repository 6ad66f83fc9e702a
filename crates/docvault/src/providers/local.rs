//! Local filesystem blob store
//!
//! Layout: `<root>/<first two chars of id>/<id>.<ext>`.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

use super::blob_store::{BlobReader, BlobStore};

/// Prefix of the files used by the write probe
const PROBE_PREFIX: &str = ".write_probe";

/// Attempts to create a blob when its shard is pruned underneath us
const CREATE_ATTEMPTS: usize = 5;

/// Local document store using filesystem
pub struct LocalBlobStore {
    /// Directory to store documents
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a new local blob store, creating the root directory if needed
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| {
            Error::storage(format!(
                "Failed to create repository root {}: {}",
                root.display(),
                e
            ))
        })?;

        let root = root.canonicalize().map_err(|e| {
            Error::storage(format!("Failed to resolve repository root {}: {}", root.display(), e))
        })?;

        Ok(Self { root })
    }

    /// Shard directory for a document
    fn shard_dir(&self, doc_id: &str) -> Result<PathBuf> {
        let valid = doc_id.len() >= 2
            && doc_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(Error::storage(format!("Invalid document id for storage: {:?}", doc_id)));
        }
        Ok(self.root.join(&doc_id[..2]))
    }

    /// Get path for a document
    pub fn blob_path(&self, doc_id: &str, extension: &str) -> Result<PathBuf> {
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::storage(format!("Invalid file extension: {:?}", extension)));
        }
        Ok(self.shard_dir(doc_id)?.join(format!("{}.{}", doc_id, extension)))
    }

    /// Resolve a stored path, rejecting anything outside the root
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let candidate = PathBuf::from(path);
        let escapes = candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir));

        if escapes || !candidate.starts_with(&self.root) {
            return Err(Error::storage(format!(
                "Path {} is outside the repository root {}",
                path,
                self.root.display()
            )));
        }
        Ok(candidate)
    }

    /// Create a fresh blob file, recreating its shard if it was pruned meanwhile
    async fn create_blob(&self, doc_path: &Path) -> Result<tokio::fs::File> {
        let shard = doc_path.parent().unwrap_or(&self.root);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match tokio::fs::create_dir(shard).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(Error::storage(format!(
                        "Failed to create directory {}: {}",
                        shard.display(),
                        e
                    )))
                }
            }

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(doc_path)
                .await
            {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == ErrorKind::NotFound && attempt < CREATE_ATTEMPTS => {
                    tracing::debug!("Shard {} was pruned before create, retrying", shard.display());
                }
                Err(e) => {
                    return Err(Error::storage(format!(
                        "Failed to create {}: {}",
                        doc_path.display(),
                        e
                    )))
                }
            }
        }
    }

    /// Remove a shard directory once it holds no more blobs
    fn prune_shard(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if parent != self.root {
                // Fails harmlessly while the directory still has entries
                let _ = std::fs::remove_dir(parent);
            }
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn write(&self, doc_id: &str, extension: &str, data: &[u8]) -> Result<String> {
        let doc_path = self.blob_path(doc_id, extension)?;

        if !self.root.is_dir() {
            return Err(Error::storage(format!(
                "Repository root {} does not exist",
                self.root.display()
            )));
        }

        let mut file = self.create_blob(&doc_path).await?;

        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            self.discard(&doc_path.to_string_lossy());
            return Err(Error::storage(format!(
                "Failed to write {}: {}",
                doc_path.display(),
                e
            )));
        }

        tracing::debug!("Stored {} bytes at {}", data.len(), doc_path.display());
        Ok(doc_path.to_string_lossy().to_string())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let doc_path = self.resolve(path)?;
        tokio::fs::read(&doc_path)
            .await
            .map_err(|e| read_error(path, e))
    }

    async fn open(&self, path: &str) -> Result<BlobReader> {
        let doc_path = self.resolve(path)?;
        let file = tokio::fs::File::open(&doc_path)
            .await
            .map_err(|e| read_error(path, e))?;
        Ok(Box::new(file))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let doc_path = self.resolve(path)?;
        Ok(tokio::fs::metadata(&doc_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let doc_path = self.resolve(path)?;

        match tokio::fs::remove_file(&doc_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("Blob {} was already missing", path);
            }
            Err(e) => {
                return Err(Error::storage(format!("Failed to delete {}: {}", path, e)));
            }
        }

        self.prune_shard(&doc_path);
        Ok(())
    }

    fn discard(&self, path: &str) {
        let Ok(doc_path) = self.resolve(path) else {
            tracing::error!("Refusing to discard {} outside the repository", path);
            return;
        };

        match std::fs::remove_file(&doc_path) {
            Ok(()) => tracing::info!("Discarded orphaned blob {}", path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::error!("Failed to discard orphaned blob {}: {}", path, e),
        }
        self.prune_shard(&doc_path);
    }

    async fn probe(&self) -> Result<()> {
        let probe = self
            .root
            .join(format!("{}-{}", PROBE_PREFIX, uuid::Uuid::new_v4()));
        tokio::fs::write(&probe, b"ok").await.map_err(|e| {
            Error::storage(format!("Repository {} is not writable: {}", self.root.display(), e))
        })?;
        match tokio::fs::remove_file(&probe).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!(
                "Failed to remove write probe {}: {}",
                probe.display(),
                e
            ))),
        }
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}

fn read_error(path: &str, e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::NotFound => Error::DocumentNotFound(format!("file {}", path)),
        _ => Error::storage(format!("Failed to read {}: {}", path, e)),
    }
}
