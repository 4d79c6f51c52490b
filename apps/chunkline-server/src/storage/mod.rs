//! Object storage for assembled files
//!
//! Supports the local filesystem and S3-compatible buckets (MinIO, Cloudflare
//! R2, Backblaze B2, AWS S3).

mod local;
mod s3_client;

pub use local::LocalBlobStore;
pub use s3_client::S3Client;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Destination for assembled files
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the file at `source` under `key`, replacing any previous content.
    /// The store may move `source` instead of copying it.
    async fn put_file(&self, key: &str, source: &Path, content_type: &str) -> Result<()>;

    /// Read an object back
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    /// URL a client can use to download the object
    async fn public_url(&self, key: &str) -> Result<String>;
}

/// Guess content type from file extension
pub fn guess_content_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext.to_lowercase().as_str() {
        "pdf" => "application/pdf",
        "epub" => "application/epub+zip",
        "txt" => "text/plain; charset=utf-8",
        "json" => "application/json",
        "zip" => "application/zip",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Percent-encode each path segment of an object key
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
