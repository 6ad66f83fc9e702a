//! Upload validation and the document pipeline

pub mod pipeline;
pub mod validator;

pub use pipeline::DocumentPipeline;
pub use validator::{sniff, SniffedType, UploadPolicy, UploadRequest, ValidatedUpload};
