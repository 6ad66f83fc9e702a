//! Storage module for persistent metadata
//!
//! Provides SQLite-based persistence for document records.

mod database;

pub use database::{DocumentDb, DocumentStats, EXPECTED_COLUMNS};
