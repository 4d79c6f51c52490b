//! Upload sources
//!
//! A source is read twice: once as a stream for fingerprinting and then by
//! byte range, lazily, for each chunk payload.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::segment::ChunkBounds;
use crate::error::{Result, UploadError};

#[derive(Debug, Clone)]
pub enum ChunkSource {
    /// A file on the local filesystem
    File { path: PathBuf, name: String },
    /// Bytes already held in memory
    Memory { name: String, data: Arc<[u8]> },
}

impl ChunkSource {
    /// Source backed by a local file, named after its final path component
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        ChunkSource::File { path, name }
    }

    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        ChunkSource::Memory {
            name: name.into(),
            data: data.into(),
        }
    }

    /// File name registered with the collaborator
    pub fn name(&self) -> &str {
        match self {
            ChunkSource::File { name, .. } | ChunkSource::Memory { name, .. } => name,
        }
    }

    /// Path used in error messages
    pub fn display_path(&self) -> PathBuf {
        match self {
            ChunkSource::File { path, .. } => path.clone(),
            ChunkSource::Memory { name, .. } => PathBuf::from(name),
        }
    }

    pub async fn size(&self) -> Result<u64> {
        match self {
            ChunkSource::File { path, .. } => {
                let metadata = tokio::fs::metadata(path)
                    .await
                    .map_err(|e| UploadError::io(path, e))?;
                if !metadata.is_file() {
                    return Err(UploadError::Validation(format!(
                        "not a regular file: {}",
                        path.display()
                    )));
                }
                Ok(metadata.len())
            }
            ChunkSource::Memory { data, .. } => Ok(data.len() as u64),
        }
    }

    /// Read the payload of one chunk
    pub async fn read_chunk(&self, bounds: &ChunkBounds) -> Result<Vec<u8>> {
        match self {
            ChunkSource::File { path, .. } => {
                let mut file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| UploadError::io(path, e))?;
                file.seek(SeekFrom::Start(bounds.start))
                    .await
                    .map_err(|e| UploadError::io(path, e))?;

                let mut payload = vec![0u8; bounds.len() as usize];
                file.read_exact(&mut payload)
                    .await
                    .map_err(|e| UploadError::io(path, e))?;
                Ok(payload)
            }
            ChunkSource::Memory { data, name } => data
                .get(bounds.start as usize..bounds.end as usize)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| {
                    UploadError::io(
                        name,
                        std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "chunk range past end of data",
                        ),
                    )
                }),
        }
    }
}
