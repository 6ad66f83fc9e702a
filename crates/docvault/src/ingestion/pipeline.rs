//! Document pipeline orchestration
//!
//! Couples the blob store and the metadata store so that every record has a
//! backing file and no file outlives its record.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::{BlobReader, BlobStore};
use crate::storage::{DocumentDb, DocumentStats};
use crate::types::document::new_document_id;
use crate::types::query::MAX_LIST_LIMIT;
use crate::types::{DocumentFilter, DocumentRecord, DocumentStatus};

use super::validator::{UploadPolicy, UploadRequest};

/// A blob written ahead of its metadata row
///
/// Removed on drop unless committed.
struct StagedBlob {
    blobs: Arc<dyn BlobStore>,
    path: Option<String>,
}

impl StagedBlob {
    fn new(blobs: Arc<dyn BlobStore>, path: String) -> Self {
        Self {
            blobs,
            path: Some(path),
        }
    }

    fn commit(mut self) {
        self.path = None;
    }
}

impl Drop for StagedBlob {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            self.blobs.discard(&path);
        }
    }
}

/// Main document pipeline
pub struct DocumentPipeline {
    db: Arc<DocumentDb>,
    blobs: Arc<dyn BlobStore>,
    policy: UploadPolicy,
}

impl DocumentPipeline {
    /// Create a new pipeline
    pub fn new(db: Arc<DocumentDb>, blobs: Arc<dyn BlobStore>, policy: UploadPolicy) -> Self {
        Self { db, blobs, policy }
    }

    /// Metadata store
    pub fn db(&self) -> &Arc<DocumentDb> {
        &self.db
    }

    /// Upload constraints
    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Run a metadata store call on the blocking pool
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DocumentDb) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    /// Validate and store an upload
    pub async fn create(&self, upload: UploadRequest) -> Result<DocumentRecord> {
        let upload = self.policy.validate(upload)?;
        let id = new_document_id();

        let path = self.blobs.write(&id, &upload.extension, &upload.data).await?;
        let staged = StagedBlob::new(self.blobs.clone(), path.clone());

        let record = DocumentRecord::new(id, upload.name, upload.original_filename, path);

        // Insert and commit run in the same blocking task
        let row = record.clone();
        self.with_db(move |db| {
            db.create(&row)?;
            staged.commit();
            Ok(())
        })
        .await?;

        tracing::info!(
            "Stored document {} ({}, {} bytes, {})",
            record.id,
            record.name,
            upload.data.len(),
            upload.mime_type
        );
        Ok(record)
    }

    /// Get a record by ID
    pub async fn get(&self, id: &str) -> Result<DocumentRecord> {
        let id = id.to_string();
        self.with_db(move |db| db.get(&id)).await
    }

    /// List records in creation order
    pub async fn list(&self, filter: DocumentFilter) -> Result<Vec<DocumentRecord>> {
        self.with_db(move |db| db.list(&filter)).await
    }

    /// Document counts per status
    pub async fn stats(&self) -> Result<DocumentStats> {
        self.with_db(|db| db.stats()).await
    }

    /// Record plus a streaming reader for download
    ///
    /// A record whose file has vanished is marked `error` and reported missing.
    pub async fn open(&self, id: &str) -> Result<(DocumentRecord, BlobReader)> {
        let record = self.get(id).await?;

        match self.blobs.open(&record.local_path).await {
            Ok(reader) => Ok((record, reader)),
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    "Blob for document {} is missing at {}",
                    record.id,
                    record.local_path
                );
                self.mark_error(&record.id).await;
                Err(Error::DocumentNotFound(record.id))
            }
            Err(e) => Err(e),
        }
    }

    /// Delete a record and its file
    pub async fn delete(&self, id: &str) -> Result<DocumentRecord> {
        let record = self.get(id).await?;

        self.blobs.delete(&record.local_path).await?;

        let doc_id = record.id.clone();
        if let Err(e) = self.with_db(move |db| db.delete(&doc_id)).await {
            tracing::error!(
                "Removed file for {} but failed to delete its record: {}",
                record.id,
                e
            );
            self.mark_error(&record.id).await;
            return Err(e);
        }

        tracing::info!("Deleted document {} ({})", record.id, record.name);
        Ok(record)
    }

    /// Post-upload check: `processed` if the file reads back, else `error`
    pub async fn verify(&self, id: &str) -> Result<DocumentRecord> {
        let record = self.get(id).await?;

        let status = match self.blobs.read(&record.local_path).await {
            Ok(_) => DocumentStatus::Processed,
            Err(e) => {
                tracing::warn!("Verification failed for document {}: {}", record.id, e);
                DocumentStatus::Error
            }
        };

        let doc_id = record.id;
        self.with_db(move |db| db.update_status(&doc_id, status))
            .await
    }

    /// Mark every record whose file is missing as `error`
    ///
    /// Returns the number of records changed.
    pub async fn reconcile(&self) -> Result<usize> {
        let mut changed = 0;
        let mut skip = 0;

        loop {
            let filter = DocumentFilter {
                skip,
                limit: MAX_LIST_LIMIT,
                status: None,
            };
            let page = self.list(filter).await?;
            let page_len = page.len();

            for record in page {
                if record.status == DocumentStatus::Error {
                    continue;
                }

                let present = self.blobs.exists(&record.local_path).await.unwrap_or(false);
                if !present {
                    tracing::warn!(
                        "Document {} has no file at {}, marking as error",
                        record.id,
                        record.local_path
                    );
                    let doc_id = record.id;
                    self.with_db(move |db| db.update_status(&doc_id, DocumentStatus::Error))
                        .await?;
                    changed += 1;
                }
            }

            if page_len < MAX_LIST_LIMIT {
                break;
            }
            skip += page_len;
        }

        if changed > 0 {
            tracing::warn!("Reconcile marked {} document(s) as error", changed);
        } else {
            tracing::info!("Reconcile found no missing files");
        }
        Ok(changed)
    }

    /// Best-effort status change to `error`
    async fn mark_error(&self, id: &str) {
        let doc_id = id.to_string();
        if let Err(e) = self
            .with_db(move |db| db.update_status(&doc_id, DocumentStatus::Error))
            .await
        {
            tracing::error!("Failed to mark document {} as error: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::providers::LocalBlobStore;
    use bytes::Bytes;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn pipeline() -> (DocumentPipeline, TempDir) {
        let dir = TempDir::new().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(dir.path()).unwrap());
        let db = Arc::new(DocumentDb::in_memory().unwrap());
        let policy = UploadPolicy::new(&UploadConfig::default());
        (DocumentPipeline::new(db, blobs, policy), dir)
    }

    fn upload(name: &str, filename: &str, data: &[u8]) -> UploadRequest {
        UploadRequest {
            name: Some(name.to_string()),
            filename: Some(filename.to_string()),
            data: Some(Bytes::copy_from_slice(data)),
        }
    }

    fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .map(|p| if p.is_dir() { count_files(&p) } else { 1 })
            .sum()
    }

    #[tokio::test]
    async fn test_create_and_open() {
        let (pipeline, _dir) = pipeline();

        let record = pipeline
            .create(upload("Contract", "contract.txt", b"terms and conditions"))
            .await
            .unwrap();
        assert_eq!(record.status, DocumentStatus::Pending);
        assert!(record.local_path.ends_with(&format!("{}.txt", record.id)));

        let (fetched, mut reader) = pipeline.open(&record.id).await.unwrap();
        assert_eq!(fetched, record);
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"terms and conditions");
    }

    #[tokio::test]
    async fn test_rejected_upload_leaves_nothing() {
        let (pipeline, dir) = pipeline();

        assert!(pipeline.create(upload("Empty", "e.txt", b"")).await.is_err());
        assert!(pipeline.create(upload("", "e.txt", b"data")).await.is_err());

        assert!(pipeline.list(DocumentFilter::default()).await.unwrap().is_empty());
        assert_eq!(count_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_insert_failure_removes_blob() {
        let (pipeline, dir) = pipeline();
        pipeline.db().execute_raw("DROP TABLE documents").unwrap();

        let err = pipeline
            .create(upload("Doc", "doc.txt", b"content"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert_eq!(count_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_failed_write_creates_no_record() {
        let (pipeline, dir) = pipeline();
        std::fs::remove_dir_all(dir.path()).unwrap();

        let err = pipeline
            .create(upload("Doc", "doc.txt", b"content"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(pipeline.list(DocumentFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (pipeline, _dir) = pipeline();
        let record = pipeline
            .create(upload("Doc", "doc.txt", b"content"))
            .await
            .unwrap();

        let deleted = pipeline.delete(&record.id).await.unwrap();
        assert_eq!(deleted.id, record.id);
        assert!(!Path::new(&record.local_path).exists());

        assert!(pipeline.get(&record.id).await.unwrap_err().is_not_found());
        assert!(pipeline.open(&record.id).await.err().unwrap().is_not_found());
        assert!(pipeline.delete(&record.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_with_missing_file() {
        let (pipeline, _dir) = pipeline();
        let record = pipeline
            .create(upload("Doc", "doc.txt", b"content"))
            .await
            .unwrap();
        std::fs::remove_file(&record.local_path).unwrap();

        pipeline.delete(&record.id).await.unwrap();
        assert!(pipeline.get(&record.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_verify() {
        let (pipeline, _dir) = pipeline();
        let good = pipeline.create(upload("A", "a.txt", b"a")).await.unwrap();
        let bad = pipeline.create(upload("B", "b.txt", b"b")).await.unwrap();
        std::fs::remove_file(&bad.local_path).unwrap();

        assert_eq!(
            pipeline.verify(&good.id).await.unwrap().status,
            DocumentStatus::Processed
        );
        assert_eq!(
            pipeline.verify(&bad.id).await.unwrap().status,
            DocumentStatus::Error
        );
        assert!(pipeline.verify("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_open_missing_file_marks_error() {
        let (pipeline, _dir) = pipeline();
        let record = pipeline.create(upload("A", "a.txt", b"a")).await.unwrap();
        std::fs::remove_file(&record.local_path).unwrap();

        assert!(pipeline.open(&record.id).await.err().unwrap().is_not_found());
        assert_eq!(
            pipeline.get(&record.id).await.unwrap().status,
            DocumentStatus::Error
        );
    }

    #[tokio::test]
    async fn test_reconcile() {
        let (pipeline, _dir) = pipeline();
        let kept = pipeline.create(upload("A", "a.txt", b"a")).await.unwrap();
        let lost = pipeline.create(upload("B", "b.txt", b"b")).await.unwrap();
        std::fs::remove_file(&lost.local_path).unwrap();

        assert_eq!(pipeline.reconcile().await.unwrap(), 1);
        assert_eq!(pipeline.reconcile().await.unwrap(), 0);

        assert_eq!(
            pipeline.get(&kept.id).await.unwrap().status,
            DocumentStatus::Pending
        );
        assert_eq!(
            pipeline.get(&lost.id).await.unwrap().status,
            DocumentStatus::Error
        );

        let stats = pipeline.stats().await.unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.count(DocumentStatus::Error), 1);
    }

    #[tokio::test]
    async fn test_list_returns_each_once() {
        let (pipeline, _dir) = pipeline();
        let mut ids = Vec::new();
        for i in 0..5 {
            let record = pipeline
                .create(upload(&format!("Doc {}", i), "d.txt", b"x"))
                .await
                .unwrap();
            ids.push(record.id);
        }

        let listed: Vec<String> = pipeline
            .list(DocumentFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(listed, ids);
    }
}
