//! Document record types

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Processing status of a stored document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Uploaded, no post-upload check has run yet
    #[default]
    Pending,
    /// Post-upload check passed
    Processed,
    /// Backing file is missing or unreadable
    Error,
}

impl DocumentStatus {
    /// All statuses, in reporting order
    pub const ALL: [DocumentStatus; 3] = [
        DocumentStatus::Pending,
        DocumentStatus::Processed,
        DocumentStatus::Error,
    ];

    /// Column value stored in the metadata table
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Error => "error",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(DocumentStatus::Pending),
            "processed" => Ok(DocumentStatus::Processed),
            "error" => Ok(DocumentStatus::Error),
            other => Err(Error::validation(format!(
                "Unknown status '{}'. Must be pending, processed, or error.",
                other
            ))),
        }
    }
}

/// A row of the `documents` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    /// Unique document ID (UUID v4)
    pub id: String,
    /// Descriptive label supplied by the client
    pub name: String,
    /// Filename as received from the client
    pub original_filename: Option<String>,
    /// Location of the stored bytes, derived from `id`
    pub local_path: String,
    /// Processing status
    pub status: DocumentStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Build a fresh `pending` record
    pub fn new(
        id: String,
        name: String,
        original_filename: Option<String>,
        local_path: String,
    ) -> Self {
        // Stored with microsecond precision
        let now = Utc::now().trunc_subsecs(6);
        Self {
            id,
            name,
            original_filename,
            local_path,
            status: DocumentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Filename offered to clients on download
    pub fn download_filename(&self) -> String {
        match &self.original_filename {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => {
                let ext = std::path::Path::new(&self.local_path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("bin");
                format!("{}.{}", self.id, ext)
            }
        }
    }
}

/// Generate a new document identifier
pub fn new_document_id() -> String {
    Uuid::new_v4().to_string()
}

/// Fixed-width RFC 3339 encoding used for timestamp columns
///
/// Lexical order of the encoded strings matches chronological order.
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp column
pub fn decode_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!("pending".parse::<DocumentStatus>().unwrap(), DocumentStatus::Pending);
        assert_eq!(" Processed ".parse::<DocumentStatus>().unwrap(), DocumentStatus::Processed);
        assert_eq!("ERROR".parse::<DocumentStatus>().unwrap(), DocumentStatus::Error);
        assert!("done".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&DocumentStatus::Processed).unwrap();
        assert_eq!(json, "\"processed\"");
    }

    #[test]
    fn test_timestamp_encoding_sorts() {
        let earlier = decode_timestamp("2024-01-01T09:00:00Z").unwrap();
        let later = decode_timestamp("2024-01-01T10:00:00.5Z").unwrap();
        assert!(encode_timestamp(&earlier) < encode_timestamp(&later));
        assert_eq!(decode_timestamp(&encode_timestamp(&later)), Some(later));
    }

    #[test]
    fn test_download_filename_fallback() {
        let mut record = DocumentRecord::new(
            "abcd".into(),
            "Report".into(),
            Some("report.pdf".into()),
            "/repo/ab/abcd.pdf".into(),
        );
        assert_eq!(record.download_filename(), "report.pdf");

        record.original_filename = None;
        assert_eq!(record.download_filename(), "abcd.pdf");
    }
}
