//! Blob store provider trait for storing raw document bytes

use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncRead;

use crate::error::Result;

/// Streaming handle on a stored blob
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Trait for document blob storage
///
/// Implementations:
/// - `LocalBlobStore`: Local filesystem
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a location derived from `doc_id`
    ///
    /// Returns the storage path. Never overwrites an existing blob.
    async fn write(&self, doc_id: &str, extension: &str, data: &[u8]) -> Result<String>;

    /// Read a stored blob by path
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Open a stored blob for streaming
    async fn open(&self, path: &str) -> Result<BlobReader>;

    /// Check if a blob exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Delete a blob; deleting a missing blob succeeds
    async fn delete(&self, path: &str) -> Result<()>;

    /// Best-effort synchronous removal, usable from `Drop`
    fn discard(&self, path: &str);

    /// Verify the store is present and writable
    async fn probe(&self) -> Result<()>;

    /// Root directory of the store
    fn root(&self) -> &Path;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
