//! docvault: document storage service
//!
//! Uploaded files are kept in a sharded directory tree and described by rows
//! of a single SQLite table. The HTTP API covers upload, listing, download,
//! deletion and a health snapshot of the service and its host.

pub mod config;
pub mod error;
pub mod health;
pub mod ingestion;
pub mod providers;
pub mod server;
pub mod storage;
pub mod types;

pub use config::DocVaultConfig;
pub use error::{Error, Result};
pub use types::{DocumentRecord, DocumentStatus};

/// Service name reported by `/info`
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Service version reported by `/health` and `/info`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
