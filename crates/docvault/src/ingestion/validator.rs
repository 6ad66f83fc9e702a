//! Upload validation and content sniffing

use bytes::Bytes;
use std::collections::HashSet;
use std::path::Path;

use crate::config::UploadConfig;
use crate::error::{Error, Result};

/// MIME type for content with no magic number that decodes as UTF-8
pub const TEXT_PLAIN: &str = "text/plain";

/// MIME type for unrecognised binary content
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extension used when neither the filename nor the content yields one
const FALLBACK_EXTENSION: &str = "txt";

const MAX_EXTENSION_LEN: usize = 10;

/// Raw upload as collected from the multipart form
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Value of the `name` field
    pub name: Option<String>,
    /// Filename sent with the `file` field
    pub filename: Option<String>,
    /// Content of the `file` field
    pub data: Option<Bytes>,
}

/// Upload that passed every check
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub name: String,
    pub original_filename: Option<String>,
    pub data: Bytes,
    /// Type detected from the content bytes
    pub mime_type: String,
    /// Extension for the stored blob
    pub extension: String,
}

/// Detected content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffedType {
    pub mime_type: String,
    pub extension: Option<String>,
}

/// Sniff the content type from magic numbers
pub fn sniff(data: &[u8]) -> SniffedType {
    if let Some(kind) = infer::get(data) {
        return SniffedType {
            mime_type: kind.mime_type().to_string(),
            extension: Some(kind.extension().to_string()),
        };
    }

    if std::str::from_utf8(data).is_ok() {
        SniffedType {
            mime_type: TEXT_PLAIN.to_string(),
            extension: Some("txt".to_string()),
        }
    } else {
        SniffedType {
            mime_type: OCTET_STREAM.to_string(),
            extension: None,
        }
    }
}

/// Extension of a client filename, if it is a short alphanumeric suffix
pub fn filename_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?;
    let valid = !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

/// Upload constraints
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_upload_size: usize,
    allowed_mime_types: HashSet<String>,
}

impl UploadPolicy {
    /// Build a policy from the upload config
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            max_upload_size: config.max_upload_size,
            allowed_mime_types: config
                .allowed_mime_types
                .iter()
                .map(|m| m.trim().to_ascii_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Maximum accepted payload in bytes
    pub fn max_upload_size(&self) -> usize {
        self.max_upload_size
    }

    /// Whether a sniffed type may be stored
    pub fn allows(&self, mime_type: &str) -> bool {
        self.allowed_mime_types.is_empty() || self.allowed_mime_types.contains(mime_type)
    }

    /// Check an upload, returning the pieces needed to store it
    pub fn validate(&self, upload: UploadRequest) -> Result<ValidatedUpload> {
        let name = upload
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::validation("Field 'name' is required and must not be blank"))?;

        let data = upload
            .data
            .ok_or_else(|| Error::validation("Field 'file' is required"))?;

        if data.is_empty() {
            return Err(Error::validation("Uploaded file is empty"));
        }

        if data.len() > self.max_upload_size {
            tracing::debug!(
                "Rejected upload of {} bytes (limit {})",
                data.len(),
                self.max_upload_size
            );
            return Err(Error::PayloadTooLarge {
                limit: self.max_upload_size,
            });
        }

        let sniffed = sniff(&data);
        if !self.allows(&sniffed.mime_type) {
            return Err(Error::UnsupportedFileType(sniffed.mime_type));
        }

        let original_filename = upload
            .filename
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());

        let extension = original_filename
            .as_deref()
            .and_then(filename_extension)
            .or(sniffed.extension)
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

        Ok(ValidatedUpload {
            name,
            original_filename,
            data,
            mime_type: sniffed.mime_type,
            extension,
        })
    }
}
