//! Configuration for the document service
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! TOML file, and environment variables (`DATABASE_URL`, `REPOSITORY_PATH`,
//! `DOCVAULT_HOST`, `DOCVAULT_PORT`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "DOCVAULT_CONFIG";

/// Config file read when `DOCVAULT_CONFIG` is unset and the file exists
pub const DEFAULT_CONFIG_FILE: &str = "docvault.toml";

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocVaultConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Metadata database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob repository configuration
    #[serde(default)]
    pub repository: RepositoryConfig,
    /// Upload validation
    #[serde(default)]
    pub upload: UploadConfig,
    /// Health check thresholds
    #[serde(default)]
    pub health: HealthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
        }
    }
}

/// Metadata database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite:///var/lib/docvault/documents.db`
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/documents.db".to_string(),
        }
    }
}

/// Where the metadata store lives once the URL is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// SQLite database file
    File(PathBuf),
    /// Private in-memory database
    Memory,
}

impl DatabaseConfig {
    /// Resolve the connection URL
    ///
    /// Accepts `sqlite:///abs/path`, `sqlite://rel/path`, `sqlite:path`,
    /// a bare filesystem path, or `:memory:` in any of those forms.
    pub fn location(&self) -> Result<DatabaseLocation> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(Error::Config("database.url must not be empty".to_string()));
        }

        let rest = if let Some(rest) = url.strip_prefix("sqlite:") {
            match rest.strip_prefix("//") {
                // sqlite:///abs -> "/abs", sqlite://rel -> "rel"
                Some(path) => path,
                None => rest,
            }
        } else if url.contains("://") {
            let scheme = url.split("://").next().unwrap_or_default();
            return Err(Error::Config(format!(
                "Unsupported database scheme '{}'. Only sqlite is supported.",
                scheme
            )));
        } else {
            url
        };

        if rest.is_empty() {
            return Err(Error::Config(format!("database.url has no path: {}", url)));
        }

        if rest == ":memory:" {
            Ok(DatabaseLocation::Memory)
        } else {
            Ok(DatabaseLocation::File(PathBuf::from(rest)))
        }
    }
}

/// Blob repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Root directory for stored files
    pub path: PathBuf,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/repository"),
        }
    }
}

/// Upload validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
    /// MIME types accepted after content sniffing; empty accepts everything
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 100 * 1024 * 1024, // 100MB
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

/// Document and image formats accepted out of the box
pub fn default_allowed_mime_types() -> Vec<String> {
    [
        "text/plain",
        "application/pdf",
        "application/rtf",
        "application/msword",
        "application/vnd.ms-excel",
        "application/vnd.ms-powerpoint",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "application/vnd.oasis.opendocument.text",
        "application/vnd.oasis.opendocument.spreadsheet",
        "application/vnd.oasis.opendocument.presentation",
        "application/epub+zip",
        "application/zip",
        "image/png",
        "image/jpeg",
        "image/gif",
        "image/webp",
        "image/tiff",
        "image/bmp",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Health check thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// CPU usage above this percentage is a warning
    pub cpu_warn_percent: f64,
    /// Memory usage above this percentage is a warning
    pub memory_warn_percent: f64,
    /// Disk usage above this percentage is a warning
    pub disk_warn_percent: f64,
    /// Repository free space below this is a warning (default: 1GB)
    pub min_free_bytes: u64,
    /// Window between the two CPU samples, in milliseconds
    pub cpu_sample_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cpu_warn_percent: 80.0,
            memory_warn_percent: 80.0,
            disk_warn_percent: 80.0,
            min_free_bytes: 1024 * 1024 * 1024, // 1GB
            cpu_sample_ms: 250,
        }
    }
}

impl DocVaultConfig {
    /// Load configuration from the optional TOML file and the process environment
    pub fn load() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();

        let path = match vars.get(CONFIG_PATH_ENV) {
            Some(p) => Some(PathBuf::from(p)),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env(&vars)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        if let Some(url) = vars.get("DATABASE_URL") {
            self.database.url = url.clone();
        }
        if let Some(path) = vars.get("REPOSITORY_PATH") {
            self.repository.path = PathBuf::from(path);
        }
        if let Some(host) = vars.get("DOCVAULT_HOST") {
            self.server.host = host.clone();
        }
        if let Some(port) = vars.get("DOCVAULT_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("DOCVAULT_PORT is not a port: {}", port)))?;
        }
        Ok(())
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("server.port must be > 0".to_string()));
        }
        if self.upload.max_upload_size == 0 {
            return Err(Error::Config("upload.max_upload_size must be > 0".to_string()));
        }
        if self.repository.path.as_os_str().is_empty() {
            return Err(Error::Config("repository.path must not be empty".to_string()));
        }

        for (key, value) in [
            ("health.cpu_warn_percent", self.health.cpu_warn_percent),
            ("health.memory_warn_percent", self.health.memory_warn_percent),
            ("health.disk_warn_percent", self.health.disk_warn_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(Error::Config(format!("{} must be in [0, 100]", key)));
            }
        }

        self.database.location()?;
        Ok(())
    }

    /// Address the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
