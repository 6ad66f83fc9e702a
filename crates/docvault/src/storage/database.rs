//! SQLite metadata store for document records
//!
//! A single flat `documents` table. The schema is created on first use and
//! checked on every open; a table missing required columns is renamed aside
//! and recreated.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseLocation};
use crate::error::{Error, Result};
use crate::types::document::{decode_timestamp, encode_timestamp};
use crate::types::{DocumentFilter, DocumentRecord, DocumentStatus};

/// Columns the service reads and writes
pub const EXPECTED_COLUMNS: [&str; 7] = [
    "id",
    "name",
    "original_filename",
    "local_path",
    "status",
    "created_at",
    "updated_at",
];

const SELECT_COLUMNS: &str =
    "id, name, original_filename, local_path, status, created_at, updated_at";

/// Per-status document counts
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DocumentStats {
    pub total_documents: usize,
    pub by_status: BTreeMap<String, usize>,
}

impl DocumentStats {
    /// Count for one status
    pub fn count(&self, status: DocumentStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

/// SQLite-based document metadata store
pub struct DocumentDb {
    conn: Arc<Mutex<Connection>>,
}

impl DocumentDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::database(format!("Failed to open database: {}", e)))?;

        Self::with_connection(conn)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::database(format!("Failed to open in-memory database: {}", e)))?;

        Self::with_connection(conn)
    }

    /// Open the store described by the database config
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        match config.location()? {
            DatabaseLocation::File(path) => Self::new(path),
            DatabaseLocation::Memory => Self::in_memory(),
        }
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Create the table if missing and repair an incompatible one
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            "#,
        )
        .map_err(|e| Error::database(format!("Failed to set pragmas: {}", e)))?;

        let columns = table_columns(&conn)?;
        if !columns.is_empty() && !has_expected_columns(&columns) {
            let legacy = format!("documents_legacy_{}", Utc::now().timestamp());
            tracing::warn!(
                "documents table has an incompatible schema ({:?}), moving it to {}",
                columns,
                legacy
            );
            conn.execute_batch(&format!("ALTER TABLE documents RENAME TO {};", legacy))
                .map_err(|e| Error::database(format!("Failed to move legacy table: {}", e)))?;
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                original_filename TEXT,
                local_path TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Database schema verified");
        Ok(())
    }

    /// Insert a new record
    pub fn create(&self, record: &DocumentRecord) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO documents (
                id, name, original_filename, local_path, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.id,
                record.name,
                record.original_filename,
                record.local_path,
                record.status.as_str(),
                encode_timestamp(&record.created_at),
                encode_timestamp(&record.updated_at),
            ],
        )
        .map_err(|e| Error::database(format!("Failed to insert document {}: {}", record.id, e)))?;

        Ok(())
    }

    /// Get a record by ID
    pub fn get(&self, id: &str) -> Result<DocumentRecord> {
        self.find(id)?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    /// Get a record by ID, `None` when absent
    pub fn find(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM documents WHERE id = ?1", SELECT_COLUMNS))
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let record = stmt
            .query_row(params![id], row_to_record)
            .optional()
            .map_err(|e| Error::database(format!("Failed to get document: {}", e)))?;

        Ok(record)
    }

    /// List records in creation order
    pub fn list(&self, filter: &DocumentFilter) -> Result<Vec<DocumentRecord>> {
        let conn = self.conn.lock();

        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(filter.skip).unwrap_or(i64::MAX);

        let records = match filter.status {
            Some(status) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM documents WHERE status = ?1 \
                         ORDER BY created_at ASC, rowid ASC LIMIT ?2 OFFSET ?3",
                        SELECT_COLUMNS
                    ))
                    .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;
                let rows = stmt
                    .query_map(params![status.as_str(), limit, offset], row_to_record)
                    .map_err(|e| Error::database(format!("Failed to list documents: {}", e)))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM documents \
                         ORDER BY created_at ASC, rowid ASC LIMIT ?1 OFFSET ?2",
                        SELECT_COLUMNS
                    ))
                    .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;
                let rows = stmt
                    .query_map(params![limit, offset], row_to_record)
                    .map_err(|e| Error::database(format!("Failed to list documents: {}", e)))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        Ok(records)
    }

    /// Change a record's status, refreshing `updated_at`
    pub fn update_status(&self, id: &str, status: DocumentStatus) -> Result<DocumentRecord> {
        {
            let conn = self.conn.lock();
            let count = conn
                .execute(
                    "UPDATE documents SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status.as_str(), encode_timestamp(&Utc::now()), id],
                )
                .map_err(|e| Error::database(format!("Failed to update document: {}", e)))?;

            if count == 0 {
                return Err(Error::DocumentNotFound(id.to_string()));
            }
        }

        self.get(id)
    }

    /// Delete a record
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();

        let count = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(|e| Error::database(format!("Failed to delete document: {}", e)))?;

        if count == 0 {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Liveness probe: `SELECT 1` plus a schema check
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock();

        let one: i64 = conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .map_err(|e| Error::database(format!("Connectivity check failed: {}", e)))?;
        if one != 1 {
            return Err(Error::database("Connectivity check returned an unexpected value"));
        }

        let columns = table_columns(&conn)?;
        if !has_expected_columns(&columns) {
            return Err(Error::database(format!(
                "documents table is missing or incomplete (found columns: {:?})",
                columns
            )));
        }
        Ok(())
    }

    /// Document counts, total and per status
    pub fn stats(&self) -> Result<DocumentStats> {
        let conn = self.conn.lock();

        let mut by_status: BTreeMap<String, usize> = DocumentStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM documents GROUP BY status")
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| Error::database(format!("Failed to count documents: {}", e)))?;

        let mut total = 0usize;
        for row in rows {
            let (status, count) = row?;
            let count = count.max(0) as usize;
            total += count;
            *by_status.entry(status).or_insert(0) += count;
        }

        Ok(DocumentStats {
            total_documents: total,
            by_status,
        })
    }

    /// Raw SQL access for schema tests
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }
}

fn table_columns(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info('documents')")
        .map_err(|e| Error::database(format!("Failed to inspect schema: {}", e)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| Error::database(format!("Failed to inspect schema: {}", e)))?
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(columns)
}

fn has_expected_columns(columns: &HashSet<String>) -> bool {
    EXPECTED_COLUMNS.iter().all(|c| columns.contains(*c))
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<DocumentRecord> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let original_filename: Option<String> = row.get(2)?;
    let local_path: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let created_at_str: String = row.get(5)?;
    let updated_at_str: String = row.get(6)?;

    // An unreadable status is surfaced as `error` rather than failing the listing
    let status = status_str.parse().unwrap_or(DocumentStatus::Error);
    let created_at = decode_timestamp(&created_at_str).unwrap_or_else(|| {
        tracing::warn!(
            "Document {} has unreadable created_at {:?}, using current time",
            id,
            created_at_str
        );
        Utc::now()
    });
    let updated_at = decode_timestamp(&updated_at_str).unwrap_or(created_at);

    Ok(DocumentRecord {
        id,
        name,
        original_filename,
        local_path,
        status,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: &str, name: &str) -> DocumentRecord {
        DocumentRecord::new(
            id.to_string(),
            name.to_string(),
            Some(format!("{}.txt", name)),
            format!("/repo/{}/{}.txt", &id[..2], id),
        )
    }

    #[test]
    fn test_create_and_get() {
        let db = DocumentDb::in_memory().unwrap();
        let rec = record("aa11", "notes");

        db.create(&rec).unwrap();

        let fetched = db.get("aa11").unwrap();
        assert_eq!(fetched.name, "notes");
        assert_eq!(fetched.status, DocumentStatus::Pending);
        assert_eq!(fetched.original_filename.as_deref(), Some("notes.txt"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let db = DocumentDb::in_memory().unwrap();
        db.create(&record("aa11", "one")).unwrap();
        assert!(db.create(&record("aa11", "two")).is_err());
    }

    #[test]
    fn test_missing_id_is_not_found() {
        let db = DocumentDb::in_memory().unwrap();
        assert!(db.get("nope").unwrap_err().is_not_found());
        assert!(db.delete("nope").unwrap_err().is_not_found());
        assert!(db
            .update_status("nope", DocumentStatus::Processed)
            .unwrap_err()
            .is_not_found());
        assert!(db.find("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_in_creation_order() {
        let db = DocumentDb::in_memory().unwrap();
        let base = Utc::now();

        // Insert out of order; listing follows created_at
        for (i, id) in ["cc33", "aa11", "bb22"].iter().enumerate() {
            let mut rec = record(id, id);
            rec.created_at = base + Duration::seconds([3, 1, 2][i]);
            rec.updated_at = rec.created_at;
            db.create(&rec).unwrap();
        }

        let ids: Vec<String> = db
            .list(&DocumentFilter::default())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["aa11", "bb22", "cc33"]);
    }

    #[test]
    fn test_list_pagination_and_filter() {
        let db = DocumentDb::in_memory().unwrap();
        for i in 0..5 {
            db.create(&record(&format!("{:02}xx", i), &format!("doc{}", i))).unwrap();
        }
        db.update_status("01xx", DocumentStatus::Processed).unwrap();
        db.update_status("03xx", DocumentStatus::Processed).unwrap();

        let page = db
            .list(&DocumentFilter { skip: 1, limit: 2, status: None })
            .unwrap();
        assert_eq!(page.len(), 2);

        let processed = db
            .list(&DocumentFilter {
                status: Some(DocumentStatus::Processed),
                ..Default::default()
            })
            .unwrap();
        let ids: Vec<&str> = processed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["01xx", "03xx"]);
    }

    #[test]
    fn test_update_status_refreshes_timestamp() {
        let db = DocumentDb::in_memory().unwrap();
        let mut rec = record("aa11", "notes");
        rec.created_at = Utc::now() - Duration::hours(1);
        rec.updated_at = rec.created_at;
        db.create(&rec).unwrap();

        let updated = db.update_status("aa11", DocumentStatus::Error).unwrap();
        assert_eq!(updated.status, DocumentStatus::Error);
        assert!(updated.updated_at > updated.created_at);
    }

    #[test]
    fn test_delete_then_get() {
        let db = DocumentDb::in_memory().unwrap();
        db.create(&record("aa11", "notes")).unwrap();

        db.delete("aa11").unwrap();
        assert!(db.get("aa11").unwrap_err().is_not_found());
        assert!(db.delete("aa11").unwrap_err().is_not_found());
    }

    #[test]
    fn test_stats() {
        let db = DocumentDb::in_memory().unwrap();
        db.create(&record("aa11", "a")).unwrap();
        db.create(&record("bb22", "b")).unwrap();
        db.create(&record("cc33", "c")).unwrap();
        db.update_status("bb22", DocumentStatus::Error).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.count(DocumentStatus::Pending), 2);
        assert_eq!(stats.count(DocumentStatus::Processed), 0);
        assert_eq!(stats.count(DocumentStatus::Error), 1);
    }

    #[test]
    fn test_unreadable_created_at_still_loads() {
        let db = DocumentDb::in_memory().unwrap();
        db.execute_raw(
            "INSERT INTO documents (id, name, original_filename, local_path, status, created_at, updated_at) \
             VALUES ('aa11', 'odd', NULL, '/tmp/aa/aa11.txt', 'pending', 'yesterday', 'yesterday');",
        )
        .unwrap();

        let rec = db.get("aa11").unwrap();
        assert_eq!(rec.name, "odd");
        assert_eq!(rec.updated_at, rec.created_at);
    }

    #[test]
    fn test_ping_detects_missing_table() {
        let db = DocumentDb::in_memory().unwrap();
        db.ping().unwrap();

        db.execute_raw("DROP TABLE documents;").unwrap();
        assert!(db.ping().is_err());
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("docs.db");

        {
            let db = DocumentDb::new(&path).unwrap();
            db.create(&record("aa11", "kept")).unwrap();
        }

        let db = DocumentDb::new(&path).unwrap();
        assert_eq!(db.get("aa11").unwrap().name, "kept");
    }

    #[test]
    fn test_incompatible_table_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE documents (id TEXT PRIMARY KEY, url TEXT);
                 INSERT INTO documents VALUES ('x', 'http://example.com');",
            )
            .unwrap();
        }

        let db = DocumentDb::new(&path).unwrap();
        db.ping().unwrap();
        assert_eq!(db.stats().unwrap().total_documents, 0);

        let conn = Connection::open(&path).unwrap();
        let legacy: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'documents_legacy_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(legacy, 1);
    }
}
