//! Response types for the HTTP API

use serde::{Deserialize, Serialize};

/// Body returned by `DELETE /documents/:id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Human-readable confirmation
    pub message: String,
    /// ID of the removed document
    pub id: String,
    /// Name of the removed document
    pub name: String,
    /// Always `"success"`
    pub status: String,
}

impl DeleteResponse {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            message: format!("Document {} deleted", id),
            id: id.to_string(),
            name: name.to_string(),
            status: "success".to_string(),
        }
    }
}
