//! Collaborator backends
//!
//! The storage side of the protocol, seen from the client: it owns chunk
//! persistence, the resume cursor and the file-complete state.

use async_trait::async_trait;

use crate::error::Result;
use crate::upload::{FileState, Fingerprint, StartUploadRequest};

mod http;
#[cfg(test)]
pub(crate) mod memory;

pub use http::HttpBackend;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// `GET /files/{hash}`; `UploadError::NotFound` for an unknown fingerprint
    async fn query_file(&self, fingerprint: &Fingerprint) -> Result<FileState>;

    /// `POST /files/start`; registering a known fingerprint keeps its progress
    async fn start_upload(&self, request: &StartUploadRequest) -> Result<FileState>;

    /// `POST /files/chunk`; re-sending an index overwrites the earlier copy.
    /// An unregistered fingerprint is a retryable transport error.
    async fn upload_chunk(
        &self,
        fingerprint: &Fingerprint,
        chunk_index: u64,
        payload: Vec<u8>,
    ) -> Result<FileState>;

    /// `GET /files/{hash}/public_url`
    async fn public_url(&self, fingerprint: &Fingerprint) -> Result<String>;
}
