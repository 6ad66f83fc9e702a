//! Host resource sampling

use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};

use crate::error::{Error, Result};

/// Memory usage at sampling time
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
}

/// Usage of the filesystem holding a path
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiskUsage {
    pub mount_point: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
}

impl DiskUsage {
    /// Build from raw byte counts
    pub fn new(mount_point: impl Into<String>, total_bytes: u64, available_bytes: u64) -> Self {
        let used = total_bytes.saturating_sub(available_bytes);
        Self {
            mount_point: mount_point.into(),
            total_bytes,
            available_bytes,
            used_percent: percent(used, total_bytes),
        }
    }
}

/// Point-in-time host sample
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemSnapshot {
    pub cpu_percent: f64,
    pub memory: MemoryUsage,
    /// Filesystem mounted at `/`
    pub root_disk: Option<DiskUsage>,
    /// Filesystem holding the repository
    pub repository_disk: Option<DiskUsage>,
}

/// Source of host resource samples
pub trait ResourceSampler: Send + Sync {
    /// Take a sample; blocks for the CPU measurement window
    fn sample(&self, repository_root: &Path) -> Result<SystemSnapshot>;
}

/// Sampler backed by `sysinfo`
pub struct SysinfoSampler {
    cpu_window: Duration,
}

impl SysinfoSampler {
    /// Create a sampler measuring CPU over `cpu_window`
    pub fn new(cpu_window: Duration) -> Self {
        Self {
            cpu_window: cpu_window.max(MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl ResourceSampler for SysinfoSampler {
    fn sample(&self, repository_root: &Path) -> Result<SystemSnapshot> {
        let mut sys = System::new();

        sys.refresh_cpu_usage();
        std::thread::sleep(self.cpu_window);
        sys.refresh_cpu_usage();
        let cpu_percent = f64::from(sys.global_cpu_usage());

        sys.refresh_memory();
        let total = sys.total_memory();
        if total == 0 {
            return Err(Error::internal("Memory statistics are unavailable"));
        }
        let available = sys.available_memory();
        let memory = MemoryUsage {
            total_bytes: total,
            available_bytes: available,
            used_percent: percent(total.saturating_sub(available), total),
        };

        let disks = Disks::new_with_refreshed_list();
        let mounts: Vec<DiskUsage> = disks
            .list()
            .iter()
            .map(|d| {
                DiskUsage::new(
                    d.mount_point().to_string_lossy(),
                    d.total_space(),
                    d.available_space(),
                )
            })
            .collect();

        let repository_root = repository_root
            .canonicalize()
            .unwrap_or_else(|_| repository_root.to_path_buf());

        Ok(SystemSnapshot {
            cpu_percent,
            memory,
            root_disk: disk_for_path(&mounts, Path::new("/")),
            repository_disk: disk_for_path(&mounts, &repository_root),
        })
    }
}

/// Disk whose mount point is the longest prefix of `path`
pub fn disk_for_path(mounts: &[DiskUsage], path: &Path) -> Option<DiskUsage> {
    mounts
        .iter()
        .filter(|d| path.starts_with(&d.mount_point))
        .max_by_key(|d| d.mount_point.len())
        .cloned()
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let value = part as f64 / whole as f64 * 100.0;
    (value * 100.0).round() / 100.0
}
