//! Chunk Store
//!
//! Durable storage for received chunks until the file is assembled.
//! Chunks are addressed by file fingerprint and chunk index, so a re-sent
//! chunk replaces the earlier copy instead of being appended twice.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// Result of concatenating a file's chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFile {
    /// SHA-256 of the assembled content, lowercase hex
    pub hash: String,
    pub size: u64,
}

/// Local filesystem chunk store
#[derive(Clone)]
pub struct ChunkStore {
    inner: Arc<ChunkStoreInner>,
}

struct ChunkStoreInner {
    base_path: PathBuf,
}

impl ChunkStore {
    /// Create a store rooted at `base_path`
    pub fn with_local_storage(base_path: PathBuf) -> Self {
        Self {
            inner: Arc::new(ChunkStoreInner { base_path }),
        }
    }

    fn file_dir(&self, hash: &str) -> PathBuf {
        self.inner.base_path.join("chunks").join(hash)
    }

    fn chunk_path(&self, hash: &str, chunk_index: i64) -> PathBuf {
        self.file_dir(hash).join(format!("{:08}.chunk", chunk_index))
    }

    /// Store a chunk, replacing any previous copy atomically
    pub async fn store_chunk(&self, hash: &str, chunk_index: i64, data: &[u8]) -> Result<()> {
        let path = self.chunk_path(hash, chunk_index);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so a concurrent reader never sees a torn chunk
        let tmp = path.with_extension(format!("partial-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(
            hash = %hash,
            chunk_index = chunk_index,
            size = data.len(),
            "Stored chunk"
        );

        Ok(())
    }

    /// Read a stored chunk
    pub async fn get_chunk(&self, hash: &str, chunk_index: i64) -> Result<Vec<u8>> {
        let path = self.chunk_path(hash, chunk_index);
        tokio::fs::read(&path).await.map_err(|e| {
            AppError::Internal(format!(
                "Failed to read chunk {} of {}: {}",
                chunk_index, hash, e
            ))
        })
    }

    /// Scratch location for an assembled file before it reaches the object store
    pub fn assembly_path(&self, hash: &str) -> PathBuf {
        self.inner
            .base_path
            .join("assembly")
            .join(format!("{}-{}.part", hash, uuid::Uuid::new_v4()))
    }

    /// Concatenate chunks `0..chunk_count` in index order into `dest`,
    /// hashing as it goes so only one chunk is held in memory at a time
    pub async fn assemble_to_file(
        &self,
        hash: &str,
        chunk_count: i64,
        dest: &Path,
    ) -> Result<AssembledFile> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut out = tokio::fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut size = 0u64;

        for i in 0..chunk_count {
            let chunk = self.get_chunk(hash, i).await?;
            hasher.update(&chunk);
            out.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }

        out.flush().await?;
        out.sync_all().await?;

        Ok(AssembledFile {
            hash: hex::encode(hasher.finalize()),
            size,
        })
    }

    /// Delete all chunks of a file
    pub async fn delete_file_chunks(&self, hash: &str) -> Result<usize> {
        let dir = self.file_dir(hash);

        if !dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        let mut entries = tokio::fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            tokio::fs::remove_file(entry.path()).await?;
            count += 1;
        }

        // Remove empty directory
        let _ = tokio::fs::remove_dir(&dir).await;

        Ok(count)
    }
}

/// Compute SHA-256 hash of data as lowercase hex
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
