//! Query parameter types

use serde::{Deserialize, Serialize};

use super::DocumentStatus;
use crate::error::Result;

/// Upper bound on `limit` for a single list call
pub const MAX_LIST_LIMIT: usize = 1000;

/// Query parameters for `GET /documents`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDocumentsQuery {
    /// Number of records to skip
    #[serde(default)]
    pub skip: usize,
    /// Maximum records to return
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Filter by status: pending, processed, error
    #[serde(default)]
    pub status: Option<String>,
}

fn default_limit() -> usize {
    100
}

impl Default for ListDocumentsQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
            status: None,
        }
    }
}

impl ListDocumentsQuery {
    /// Resolve into a store-level filter, rejecting unknown statuses
    pub fn into_filter(self) -> Result<DocumentFilter> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<DocumentStatus>()?),
        };

        Ok(DocumentFilter {
            skip: self.skip,
            limit: self.limit.min(MAX_LIST_LIMIT),
            status,
        })
    }
}

/// Filter applied by the metadata store when listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentFilter {
    pub skip: usize,
    pub limit: usize,
    pub status: Option<DocumentStatus>,
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: MAX_LIST_LIMIT,
            status: None,
        }
    }
}
