//! Fingerprinter
//!
//! Streams the full content of a source through SHA-256. Names, timestamps
//! and other metadata never contribute to the fingerprint.

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::source::ChunkSource;
use super::types::Fingerprint;
use crate::error::{Result, UploadError};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Fingerprint the complete content of `source`
pub async fn fingerprint(source: &ChunkSource) -> Result<Fingerprint> {
    match source {
        ChunkSource::File { path, .. } => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| UploadError::io(path, e))?;
            fingerprint_reader(file)
                .await
                .map_err(|e| UploadError::io(path, e))
        }
        ChunkSource::Memory { data, .. } => Ok(fingerprint_bytes(data)),
    }
}

/// Fingerprint everything `reader` yields until end of stream
pub async fn fingerprint_reader<R>(mut reader: R) -> std::io::Result<Fingerprint>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(Fingerprint::from_digest(&hasher.finalize()))
}

pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    Fingerprint::from_digest(&Sha256::digest(data))
}
