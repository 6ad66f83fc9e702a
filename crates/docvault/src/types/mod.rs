//! Core types for the document service

pub mod document;
pub mod query;
pub mod response;

pub use document::{DocumentRecord, DocumentStatus};
pub use query::{DocumentFilter, ListDocumentsQuery};
pub use response::DeleteResponse;
