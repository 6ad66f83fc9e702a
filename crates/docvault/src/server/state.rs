//! Application state for the document server

use std::sync::Arc;
use std::time::Duration;

use crate::config::DocVaultConfig;
use crate::error::Result;
use crate::health::{HealthReporter, ResourceSampler, SysinfoSampler};
use crate::ingestion::{DocumentPipeline, UploadPolicy};
use crate::providers::{BlobStore, LocalBlobStore};
use crate::storage::DocumentDb;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: DocVaultConfig,
    /// Upload, download and delete orchestration
    pipeline: DocumentPipeline,
    /// Health snapshots
    health: HealthReporter,
}

impl AppState {
    /// Create new application state from configuration
    pub fn new(config: DocVaultConfig) -> Result<Self> {
        tracing::info!("Initializing document service state...");

        let db = Arc::new(DocumentDb::open(&config.database)?);
        tracing::info!("Metadata store opened ({})", config.database.url);

        let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&config.repository.path)?);
        tracing::info!(
            "Blob store initialized ({} at {})",
            blobs.name(),
            blobs.root().display()
        );

        let sampler = Arc::new(SysinfoSampler::new(Duration::from_millis(
            config.health.cpu_sample_ms,
        )));

        Ok(Self::from_parts(config, db, blobs, sampler))
    }

    /// Assemble state from already-built components
    pub fn from_parts(
        config: DocVaultConfig,
        db: Arc<DocumentDb>,
        blobs: Arc<dyn BlobStore>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Self {
        let pipeline = DocumentPipeline::new(
            db.clone(),
            blobs.clone(),
            UploadPolicy::new(&config.upload),
        );
        let health = HealthReporter::new(db, blobs, sampler, config.health.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pipeline,
                health,
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &DocVaultConfig {
        &self.inner.config
    }

    /// Get document pipeline
    pub fn pipeline(&self) -> &DocumentPipeline {
        &self.inner.pipeline
    }

    /// Get health reporter
    pub fn health(&self) -> &HealthReporter {
        &self.inner.health
    }
}
