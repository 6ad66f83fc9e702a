//! Health reporting
//!
//! One point-in-time snapshot per request: metadata store liveness, host
//! resources, repository writability and documents in `error` state.

pub mod system;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::HealthConfig;
use crate::error::Result;
use crate::providers::BlobStore;
use crate::storage::{DocumentDb, DocumentStats};
use crate::types::DocumentStatus;

pub use system::{DiskUsage, MemoryUsage, ResourceSampler, SysinfoSampler, SystemSnapshot};

/// Status of a single check
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Warning,
    Unhealthy,
}

/// Aggregated service status
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Host resource check
#[derive(Debug, Clone, Serialize)]
pub struct SystemCheck {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<SystemSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metadata store check
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseCheck {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<DocumentStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Blob repository check
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryCheck {
    pub status: CheckStatus,
    pub path: PathBuf,
    pub writable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<DiskUsage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Documents in `error` state
#[derive(Debug, Clone, Serialize)]
pub struct DocumentsCheck {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// All sub-checks
#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub system: SystemCheck,
    pub database: DatabaseCheck,
    pub repository: RepositoryCheck,
    pub documents: DocumentsCheck,
}

impl HealthChecks {
    fn statuses(&self) -> [CheckStatus; 4] {
        [
            self.system.status,
            self.database.status,
            self.repository.status,
            self.documents.status,
        ]
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub checks: HealthChecks,
}

impl HealthReport {
    /// Assemble a report, deriving the overall status
    pub fn new(checks: HealthChecks) -> Self {
        let worst = checks
            .statuses()
            .into_iter()
            .max()
            .unwrap_or(CheckStatus::Healthy);

        let status = match worst {
            CheckStatus::Healthy => OverallStatus::Healthy,
            CheckStatus::Warning => OverallStatus::Degraded,
            CheckStatus::Unhealthy => OverallStatus::Unhealthy,
        };

        Self {
            status,
            timestamp: Utc::now(),
            version: crate::VERSION,
            checks,
        }
    }

    /// Whether the service should answer 503
    pub fn is_unhealthy(&self) -> bool {
        self.status == OverallStatus::Unhealthy
    }
}

/// Evaluate a resource sample against the thresholds
pub fn system_check(sample: Result<SystemSnapshot>, thresholds: &HealthConfig) -> SystemCheck {
    let snapshot = match sample {
        Ok(snapshot) => snapshot,
        Err(e) => {
            return SystemCheck {
                status: CheckStatus::Unhealthy,
                info: None,
                messages: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    };

    let mut messages = Vec::new();
    if snapshot.cpu_percent > thresholds.cpu_warn_percent {
        messages.push(format!("High CPU usage: {:.1}%", snapshot.cpu_percent));
    }
    if snapshot.memory.used_percent > thresholds.memory_warn_percent {
        messages.push(format!("High memory usage: {:.1}%", snapshot.memory.used_percent));
    }
    if let Some(disk) = &snapshot.root_disk {
        if disk.used_percent > thresholds.disk_warn_percent {
            messages.push(format!("Low disk space: {:.1}% used", disk.used_percent));
        }
    }

    SystemCheck {
        status: if messages.is_empty() {
            CheckStatus::Healthy
        } else {
            CheckStatus::Warning
        },
        info: Some(snapshot),
        messages,
        error: None,
    }
}

/// Evaluate the metadata store ping and statistics
pub fn database_check(stats: &Result<DocumentStats>) -> DatabaseCheck {
    match stats {
        Ok(stats) => DatabaseCheck {
            status: CheckStatus::Healthy,
            message: Some("Database connection successful".to_string()),
            statistics: Some(stats.clone()),
            error: None,
        },
        Err(e) => DatabaseCheck {
            status: CheckStatus::Unhealthy,
            message: None,
            statistics: None,
            error: Some(e.to_string()),
        },
    }
}

/// Evaluate the repository write probe and its filesystem usage
pub fn repository_check(
    path: PathBuf,
    probe: Result<()>,
    storage: Option<DiskUsage>,
    thresholds: &HealthConfig,
) -> RepositoryCheck {
    if let Err(e) = probe {
        return RepositoryCheck {
            status: CheckStatus::Unhealthy,
            path,
            writable: false,
            storage,
            messages: Vec::new(),
            error: Some(e.to_string()),
        };
    }

    let mut messages = Vec::new();
    if let Some(disk) = &storage {
        if disk.used_percent > thresholds.disk_warn_percent {
            messages.push(format!("Storage usage high: {:.2}%", disk.used_percent));
        }
        if disk.available_bytes < thresholds.min_free_bytes {
            messages.push(format!(
                "Low storage: {} bytes remaining",
                disk.available_bytes
            ));
        }
    }

    RepositoryCheck {
        status: if messages.is_empty() {
            CheckStatus::Healthy
        } else {
            CheckStatus::Warning
        },
        path,
        writable: true,
        storage,
        messages,
        error: None,
    }
}

/// Evaluate the count of documents in `error` state
pub fn documents_check(stats: &Result<DocumentStats>) -> DocumentsCheck {
    match stats {
        Ok(stats) => {
            let errors = stats.count(DocumentStatus::Error);
            DocumentsCheck {
                status: if errors > 0 {
                    CheckStatus::Warning
                } else {
                    CheckStatus::Healthy
                },
                error_count: Some(errors),
                message: (errors > 0).then(|| format!("{} documents in error state", errors)),
                error: None,
            }
        }
        Err(e) => DocumentsCheck {
            status: CheckStatus::Unhealthy,
            error_count: None,
            message: None,
            error: Some(e.to_string()),
        },
    }
}

/// Runs every check and assembles the report
pub struct HealthReporter {
    db: Arc<DocumentDb>,
    blobs: Arc<dyn BlobStore>,
    sampler: Arc<dyn ResourceSampler>,
    thresholds: HealthConfig,
}

impl HealthReporter {
    /// Create a new reporter
    pub fn new(
        db: Arc<DocumentDb>,
        blobs: Arc<dyn BlobStore>,
        sampler: Arc<dyn ResourceSampler>,
        thresholds: HealthConfig,
    ) -> Self {
        Self {
            db,
            blobs,
            sampler,
            thresholds,
        }
    }

    /// Take a snapshot of every check
    pub async fn report(&self) -> HealthReport {
        let db = self.db.clone();
        let stats = run_blocking(move || {
            db.ping()?;
            db.stats()
        })
        .await;

        let sampler = self.sampler.clone();
        let root = self.blobs.root().to_path_buf();
        let sample = run_blocking(move || sampler.sample(&root)).await;

        let probe = self.blobs.probe().await;

        let repository_disk = sample
            .as_ref()
            .ok()
            .and_then(|s| s.repository_disk.clone());

        let checks = HealthChecks {
            database: database_check(&stats),
            documents: documents_check(&stats),
            repository: repository_check(
                self.blobs.root().to_path_buf(),
                probe,
                repository_disk,
                &self.thresholds,
            ),
            system: system_check(sample, &self.thresholds),
        };

        let report = HealthReport::new(checks);
        match report.status {
            OverallStatus::Healthy => tracing::debug!("Health check: healthy"),
            OverallStatus::Degraded => tracing::warn!("Health check: degraded"),
            OverallStatus::Unhealthy => tracing::warn!("Health check: unhealthy"),
        }
        report
    }

    /// Readiness: the metadata store answers `ping`
    pub async fn ready(&self) -> Result<()> {
        let db = self.db.clone();
        run_blocking(move || db.ping()).await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::providers::LocalBlobStore;
    use crate::types::DocumentRecord;
    use std::path::Path;
    use tempfile::TempDir;

    const GIB: u64 = 1024 * 1024 * 1024;

    /// Sampler returning a fixed snapshot
    struct FixedSampler(SystemSnapshot);

    impl ResourceSampler for FixedSampler {
        fn sample(&self, _repository_root: &Path) -> Result<SystemSnapshot> {
            Ok(self.0.clone())
        }
    }

    struct FailingSampler;

    impl ResourceSampler for FailingSampler {
        fn sample(&self, _repository_root: &Path) -> Result<SystemSnapshot> {
            Err(Error::internal("sensors unavailable"))
        }
    }

    fn snapshot(cpu: f64, memory: f64, disk_free: u64) -> SystemSnapshot {
        SystemSnapshot {
            cpu_percent: cpu,
            memory: MemoryUsage {
                total_bytes: 16 * GIB,
                available_bytes: 8 * GIB,
                used_percent: memory,
            },
            root_disk: Some(DiskUsage::new("/", 100 * GIB, 60 * GIB)),
            repository_disk: Some(DiskUsage::new("/", 100 * GIB, disk_free)),
        }
    }

    fn reporter(sampler: impl ResourceSampler + 'static) -> (HealthReporter, Arc<DocumentDb>, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(DocumentDb::in_memory().unwrap());
        let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(dir.path()).unwrap());
        let reporter = HealthReporter::new(
            db.clone(),
            blobs,
            Arc::new(sampler),
            HealthConfig::default(),
        );
        (reporter, db, dir)
    }

    #[test]
    fn test_system_thresholds() {
        let thresholds = HealthConfig::default();

        let check = system_check(Ok(snapshot(10.0, 40.0, 50 * GIB)), &thresholds);
        assert_eq!(check.status, CheckStatus::Healthy);

        let check = system_check(Ok(snapshot(95.0, 40.0, 50 * GIB)), &thresholds);
        assert_eq!(check.status, CheckStatus::Warning);
        assert_eq!(check.messages.len(), 1);

        let check = system_check(Err(Error::internal("boom")), &thresholds);
        assert_eq!(check.status, CheckStatus::Unhealthy);
    }

    #[test]
    fn test_repository_low_free_space() {
        let thresholds = HealthConfig::default();
        let disk = DiskUsage::new("/", 100 * GIB, GIB / 2);

        let check = repository_check(PathBuf::from("/repo"), Ok(()), Some(disk), &thresholds);
        assert_eq!(check.status, CheckStatus::Warning);

        let check = repository_check(
            PathBuf::from("/repo"),
            Err(Error::storage("read-only")),
            None,
            &thresholds,
        );
        assert_eq!(check.status, CheckStatus::Unhealthy);
        assert!(!check.writable);
    }

    #[tokio::test]
    async fn test_healthy_report() {
        let (reporter, _db, _dir) = reporter(FixedSampler(snapshot(10.0, 40.0, 50 * GIB)));
        let report = reporter.report().await;

        assert_eq!(report.status, OverallStatus::Healthy);
        assert!(!report.is_unhealthy());
        assert!(report.checks.repository.writable);
        assert_eq!(report.checks.documents.error_count, Some(0));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["checks"]["database"]["statistics"]["total_documents"], 0);
    }

    #[tokio::test]
    async fn test_degraded_on_resource_warning() {
        let (reporter, _db, _dir) = reporter(FixedSampler(snapshot(10.0, 92.0, 50 * GIB)));
        assert_eq!(reporter.report().await.status, OverallStatus::Degraded);
    }

    #[tokio::test]
    async fn test_error_documents_degrade() {
        let (reporter, db, _dir) = reporter(FixedSampler(snapshot(10.0, 40.0, 50 * GIB)));
        let mut record = DocumentRecord::new("abcd".into(), "Doc".into(), None, "/x".into());
        record.status = DocumentStatus::Error;
        db.create(&record).unwrap();

        let report = reporter.report().await;
        assert_eq!(report.status, OverallStatus::Degraded);
        assert_eq!(report.checks.documents.error_count, Some(1));
    }

    #[tokio::test]
    async fn test_database_failure_is_unhealthy_regardless_of_sample() {
        let (reporter, db, _dir) = reporter(FixedSampler(snapshot(10.0, 40.0, 50 * GIB)));
        db.execute_raw("DROP TABLE documents").unwrap();

        let report = reporter.report().await;
        assert_eq!(report.status, OverallStatus::Unhealthy);
        assert_eq!(report.checks.database.status, CheckStatus::Unhealthy);
        assert_eq!(report.checks.system.status, CheckStatus::Healthy);
        assert!(reporter.ready().await.is_err());
    }

    #[tokio::test]
    async fn test_sampler_failure_is_unhealthy() {
        let (reporter, _db, _dir) = reporter(FailingSampler);
        let report = reporter.report().await;
        assert_eq!(report.status, OverallStatus::Unhealthy);
        assert_eq!(report.checks.database.status, CheckStatus::Healthy);
    }
}
