//! Chunkline
//!
//! Resumable, content-addressed chunked uploads. A file is identified by the
//! SHA-256 of its content, split into fixed-size segments and sent to a
//! storage collaborator that tracks which segments it holds. Interrupted
//! uploads resume from the collaborator's cursor without re-sending
//! acknowledged bytes.

pub mod backend;
pub mod config;
pub mod error;
pub mod upload;

pub use backend::{HttpBackend, StorageBackend};
pub use config::ClientConfig;
pub use error::{Result, UploadError};
pub use upload::{
    ChunkSource, FileState, FileStatus, Fingerprint, ProgressCallback, StatusPoller,
    UploadEvent, UploadOptions, UploadOutcome, Uploader,
};
