//! Provider abstractions for document blob storage
//!
//! `BlobStore` is the seam between the ingestion pipeline and wherever the
//! bytes live. `LocalBlobStore` keeps them on the local filesystem.

pub mod blob_store;
pub mod local;

pub use blob_store::{BlobReader, BlobStore};
pub use local::LocalBlobStore;
