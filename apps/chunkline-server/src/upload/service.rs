//! File Service
//!
//! Owns the server side of the segmented upload protocol:
//! - Idempotent session registration keyed by content fingerprint
//! - Chunk acceptance with overwrite semantics and resume cursor tracking
//! - Background assembly, verification and storage of completed files

use std::collections::HashSet;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::chunk_store::ChunkStore;
use super::locks::FingerprintLocks;
use super::types::{is_valid_fingerprint, FileInfo, FileStatus, StartUploadRequest};
use crate::db::{FileRecord, FileRepository};
use crate::error::{AppError, Result};
use crate::storage::{guess_content_type, BlobStore};

// ============================================================================
// File Service
// ============================================================================

#[derive(Clone)]
pub struct FileService {
    inner: Arc<FileServiceInner>,
}

struct FileServiceInner {
    db: SqlitePool,
    chunks: ChunkStore,
    blobs: Arc<dyn BlobStore>,
    locks: FingerprintLocks,
    assemblies: Mutex<Assemblies>,
    max_segment_size: u64,
}

/// Assembly tasks owned by the service
#[derive(Default)]
struct Assemblies {
    running: HashSet<String>,
    tasks: JoinSet<()>,
}

impl FileService {
    pub fn new(
        db: SqlitePool,
        chunks: ChunkStore,
        blobs: Arc<dyn BlobStore>,
        max_segment_size: u64,
    ) -> Self {
        Self {
            inner: Arc::new(FileServiceInner {
                db,
                chunks,
                blobs,
                locks: FingerprintLocks::new(),
                assemblies: Mutex::new(Assemblies::default()),
                max_segment_size,
            }),
        }
    }

    fn repo(&self) -> FileRepository<'_> {
        FileRepository::new(&self.inner.db)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current state of a file
    pub async fn query(&self, hash: &str) -> Result<FileInfo> {
        let record = self
            .repo()
            .get(hash)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File not found: {}", hash)))?;

        FileInfo::try_from(&record)
    }

    /// Retrieval URL for a completed file
    pub async fn public_url(&self, hash: &str) -> Result<String> {
        let record = self
            .repo()
            .get(hash)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File not found: {}", hash)))?;

        match (FileStatus::try_from(record.status), record.object_key) {
            (Ok(FileStatus::Complete), Some(key)) => self.inner.blobs.public_url(&key).await,
            _ => Err(AppError::NotFound(format!("File not uploaded yet: {}", hash))),
        }
    }

    // ========================================================================
    // Session Registration
    // ========================================================================

    /// Register an upload; an existing record is returned unchanged
    pub async fn start_upload(&self, request: &StartUploadRequest) -> Result<FileInfo> {
        request.validate(self.inner.max_segment_size)?;

        let _guard = self.inner.locks.lock(&request.hash).await;
        let repo = self.repo();

        if let Some(existing) = repo.get(&request.hash).await? {
            let status = FileStatus::try_from(existing.status).map_err(AppError::Internal)?;

            // A record left processing by a previous process has no assembly behind it
            if status == FileStatus::Processing && self.spawn_assembly(&request.hash).await {
                tracing::warn!(hash = %request.hash, "Restarted orphaned assembly");
            }

            if status != FileStatus::Failed {
                tracing::warn!(
                    hash = %request.hash,
                    status = ?status,
                    current_index = existing.current_index,
                    "Attached to existing upload"
                );
                return FileInfo::try_from(&existing);
            }

            tracing::warn!(hash = %request.hash, "Resetting failed upload");
            self.inner.chunks.delete_file_chunks(&request.hash).await?;
        }

        let record = repo
            .create(
                &request.hash,
                &request.file_name,
                request.chunk_nums,
                request.segment_size,
            )
            .await?;

        tracing::info!(
            hash = %request.hash,
            file_name = %request.file_name,
            chunk_nums = request.chunk_nums,
            segment_size = request.segment_size,
            "Registered upload"
        );

        // Nothing to wait for: an empty file is complete as soon as it exists
        if record.chunk_nums == 0 {
            let record = repo
                .update_progress(&record.hash, FileStatus::Processing, 0)
                .await?;
            self.spawn_assembly(&record.hash).await;
            return FileInfo::try_from(&record);
        }

        FileInfo::try_from(&record)
    }

    // ========================================================================
    // Chunk Acceptance
    // ========================================================================

    /// Accept one chunk and advance the resume cursor
    pub async fn receive_chunk(&self, hash: &str, chunk_index: i64, data: &[u8]) -> Result<FileInfo> {
        if !is_valid_fingerprint(hash) {
            return Err(AppError::BadRequest(format!("Invalid hash: {}", hash)));
        }

        let _guard = self.inner.locks.lock(hash).await;
        let repo = self.repo();

        let record = repo
            .get(hash)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File not found: {}", hash)))?;
        let status = FileStatus::try_from(record.status).map_err(AppError::Internal)?;

        if chunk_index < 0 || chunk_index >= record.chunk_nums {
            return Err(AppError::BadRequest(format!(
                "Chunk index out of bounds: {} (chunks: {})",
                chunk_index, record.chunk_nums
            )));
        }

        if data.len() as i64 > record.segment_size {
            return Err(AppError::BadRequest(format!(
                "Chunk of {} bytes exceeds segment size {}",
                data.len(),
                record.segment_size
            )));
        }

        if !status.accepts_chunks() {
            tracing::debug!(
                hash = %hash,
                chunk_index = chunk_index,
                status = ?status,
                "Ignoring chunk for file that is no longer pending"
            );
            return FileInfo::try_from(&record);
        }

        self.inner.chunks.store_chunk(hash, chunk_index, data).await?;
        repo.record_chunk(hash, chunk_index, data.len() as i64).await?;

        let current_index = if chunk_index == record.current_index {
            repo.advance_cursor(hash, record.current_index, record.chunk_nums)
                .await?
        } else {
            record.current_index
        };
        let next_status = if current_index >= record.chunk_nums {
            FileStatus::Processing
        } else {
            FileStatus::Pending
        };

        let updated = repo.update_progress(hash, next_status, current_index).await?;

        tracing::debug!(
            hash = %hash,
            chunk_index = chunk_index,
            current_index = current_index,
            total_chunks = record.chunk_nums,
            "Chunk received"
        );

        if next_status == FileStatus::Processing {
            self.spawn_assembly(hash).await;
        }

        FileInfo::try_from(&updated)
    }

    // ========================================================================
    // Assembly
    // ========================================================================

    /// Restart assembly for every record a previous process left processing
    pub async fn recover(&self) -> Result<usize> {
        let orphaned = self.repo().hashes_with_status(FileStatus::Processing).await?;
        for hash in &orphaned {
            tracing::info!(hash = %hash, "Resuming interrupted assembly");
            self.spawn_assembly(hash).await;
        }
        Ok(orphaned.len())
    }

    /// Wait for every running assembly to finish
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut self.inner.assemblies.lock().await.tasks);
        if !tasks.is_empty() {
            tracing::info!(count = tasks.len(), "Waiting for running assemblies");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Assembly task panicked");
            }
        }
    }

    /// Start assembling `hash` unless an assembly for it is already running.
    /// Returns whether a new task was started.
    async fn spawn_assembly(&self, hash: &str) -> bool {
        let mut assemblies = self.inner.assemblies.lock().await;
        while assemblies.tasks.try_join_next().is_some() {}

        if !assemblies.running.insert(hash.to_string()) {
            return false;
        }

        let service = self.clone();
        let hash = hash.to_string();
        assemblies.tasks.spawn(async move {
            service.assemble(&hash).await;
            service.inner.assemblies.lock().await.running.remove(&hash);
        });
        true
    }

    async fn assemble(&self, hash: &str) {
        match self.try_assemble(hash).await {
            Ok(record) => {
                tracing::info!(
                    hash = %hash,
                    object_key = record.object_key.as_deref().unwrap_or_default(),
                    "File assembled and stored"
                );
            }
            Err(e) => {
                tracing::error!(hash = %hash, error = %e, "File assembly failed");
                let _guard = self.inner.locks.lock(hash).await;
                if let Err(e) = self.repo().mark_failed(hash).await {
                    tracing::error!(hash = %hash, error = %e, "Failed to record assembly failure");
                }
            }
        }
    }

    async fn try_assemble(&self, hash: &str) -> Result<FileRecord> {
        let record = self
            .repo()
            .get(hash)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File not found: {}", hash)))?;

        tracing::info!(
            hash = %hash,
            file_name = %record.file_name,
            chunks = record.chunk_nums,
            "Assembling file from chunks"
        );

        let scratch = self.inner.chunks.assembly_path(hash);
        let stored = self.store_assembled(hash, &record, &scratch).await;

        // Stores that move the file leave nothing behind
        if let Err(e) = tokio::fs::remove_file(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %scratch.display(), error = %e, "Failed to remove scratch file");
            }
        }
        let object_key = stored?;

        let completed = {
            let _guard = self.inner.locks.lock(hash).await;
            self.repo().mark_complete(hash, &object_key).await?
        };

        // The object is durable; leftover chunks only cost disk space
        if let Err(e) = self.inner.chunks.delete_file_chunks(hash).await {
            tracing::warn!(hash = %hash, error = %e, "Failed to delete chunks of completed file");
        }
        if let Err(e) = self.repo().clear_chunks(hash).await {
            tracing::warn!(hash = %hash, error = %e, "Failed to clear chunk records of completed file");
        }

        Ok(completed)
    }

    /// Concatenate, verify and store the chunks of `record`, returning the object key
    async fn store_assembled(
        &self,
        hash: &str,
        record: &FileRecord,
        scratch: &std::path::Path,
    ) -> Result<String> {
        let assembled = self
            .inner
            .chunks
            .assemble_to_file(hash, record.chunk_nums, scratch)
            .await?;

        if assembled.hash != hash {
            return Err(AppError::Conflict(format!(
                "Assembled content hash mismatch: expected {}, got {}",
                hash, assembled.hash
            )));
        }

        let object_key = format!("files/{}-{}", Uuid::new_v4(), sanitize_file_name(&record.file_name));
        self.inner
            .blobs
            .put_file(&object_key, scratch, guess_content_type(&object_key))
            .await?;

        tracing::debug!(hash = %hash, size = assembled.size, object_key = %object_key, "Stored assembled file");
        Ok(object_key)
    }
}

/// Keep a client-supplied file name usable as a single key segment
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use crate::storage::LocalBlobStore;
    use crate::upload::compute_hash;
    use std::time::Duration;
    use tempfile::TempDir;

    fn service_on(temp_dir: &TempDir, pool: SqlitePool) -> FileService {
        let chunks = ChunkStore::with_local_storage(temp_dir.path().to_path_buf());
        let blobs = Arc::new(LocalBlobStore::new(
            temp_dir.path().join("objects"),
            "http://localhost:3000",
        ));
        FileService::new(pool, chunks, blobs, 4096)
    }

    async fn service(temp_dir: &TempDir) -> FileService {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        service_on(temp_dir, pool)
    }

    async fn file_pool(temp_dir: &TempDir) -> SqlitePool {
        let url = format!("sqlite://{}", temp_dir.path().join("chunkline.db").display());
        create_pool(&url).await.unwrap()
    }

    /// Leave a fully received file in the processing state with no assembly running
    async fn interrupted_upload(temp_dir: &TempDir, data: &[u8]) -> StartUploadRequest {
        let pool = file_pool(temp_dir).await;
        let service = service_on(temp_dir, pool.clone());
        let request = start_request(data, 4);
        service.start_upload(&request).await.unwrap();

        let repo = FileRepository::new(&pool);
        for (index, chunk) in data.chunks(4).enumerate() {
            let index = index as i64;
            service.inner.chunks.store_chunk(&request.hash, index, chunk).await.unwrap();
            repo.record_chunk(&request.hash, index, chunk.len() as i64).await.unwrap();
        }
        repo.update_progress(&request.hash, FileStatus::Processing, request.chunk_nums)
            .await
            .unwrap();

        pool.close().await;
        request
    }

    fn stored_objects(temp_dir: &TempDir) -> usize {
        std::fs::read_dir(temp_dir.path().join("objects").join("files"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    fn start_request(data: &[u8], segment_size: i64) -> StartUploadRequest {
        let chunk_nums = (data.len() as i64 + segment_size - 1) / segment_size;
        StartUploadRequest {
            hash: compute_hash(data),
            file_name: "paper.pdf".to_string(),
            chunk_nums,
            segment_size,
        }
    }

    async fn wait_for_terminal(service: &FileService, hash: &str) -> FileInfo {
        for _ in 0..200 {
            let info = service.query(hash).await.unwrap();
            if matches!(info.status, FileStatus::Complete | FileStatus::Failed) {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("file {} never reached a terminal state", hash);
    }

    #[tokio::test]
    async fn test_start_upload_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir).await;
        let data = vec![7u8; 5000];
        let request = start_request(&data, 2048);

        service.start_upload(&request).await.unwrap();
        service.receive_chunk(&request.hash, 0, &data[..2048]).await.unwrap();

        let again = service.start_upload(&request).await.unwrap();
        assert_eq!(again.current_index, 1);
        assert_eq!(again.status, FileStatus::Pending);
    }

    #[tokio::test]
    async fn test_cursor_tracks_contiguous_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir).await;
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let request = start_request(&data, 2048);
        service.start_upload(&request).await.unwrap();

        let info = service.receive_chunk(&request.hash, 1, &data[2048..4096]).await.unwrap();
        assert_eq!(info.current_index, 0);

        let info = service.receive_chunk(&request.hash, 0, &data[..2048]).await.unwrap();
        assert_eq!(info.current_index, 2);
        assert_eq!(info.status, FileStatus::Pending);

        let info = service.receive_chunk(&request.hash, 2, &data[4096..]).await.unwrap();
        assert_eq!(info.current_index, 3);
        assert_eq!(info.status, FileStatus::Processing);

        let done = wait_for_terminal(&service, &request.hash).await;
        assert_eq!(done.status, FileStatus::Complete);

        let url = service.public_url(&request.hash).await.unwrap();
        assert!(url.starts_with("http://localhost:3000/v1/objects/files/"));
    }

    #[tokio::test]
    async fn test_resent_chunk_does_not_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir).await;
        let data = b"abcdefgh".to_vec();
        let request = start_request(&data, 4);
        service.start_upload(&request).await.unwrap();

        service.receive_chunk(&request.hash, 0, &data[..4]).await.unwrap();
        service.receive_chunk(&request.hash, 0, &data[..4]).await.unwrap();
        service.receive_chunk(&request.hash, 1, &data[4..]).await.unwrap();

        let done = wait_for_terminal(&service, &request.hash).await;
        assert_eq!(done.status, FileStatus::Complete);
    }

    #[tokio::test]
    async fn test_corrupt_content_marks_failed_and_reregistration_resets() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir).await;
        let data = b"abcdefgh".to_vec();
        let request = start_request(&data, 4);
        service.start_upload(&request).await.unwrap();

        service.receive_chunk(&request.hash, 0, b"XXXX").await.unwrap();
        service.receive_chunk(&request.hash, 1, &data[4..]).await.unwrap();

        let failed = wait_for_terminal(&service, &request.hash).await;
        assert_eq!(failed.status, FileStatus::Failed);
        assert!(service.public_url(&request.hash).await.is_err());

        let reset = service.start_upload(&request).await.unwrap();
        assert_eq!(reset.status, FileStatus::Pending);
        assert_eq!(reset.current_index, 0);
    }

    #[tokio::test]
    async fn test_empty_file_completes_without_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir).await;
        let request = start_request(b"", 2048);
        assert_eq!(request.chunk_nums, 0);

        service.start_upload(&request).await.unwrap();
        let done = wait_for_terminal(&service, &request.hash).await;
        assert_eq!(done.status, FileStatus::Complete);
    }

    #[tokio::test]
    async fn test_chunk_validation() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir).await;
        let data = vec![1u8; 100];
        let request = start_request(&data, 64);

        let unknown = service.receive_chunk(&request.hash, 0, &data[..64]).await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));

        service.start_upload(&request).await.unwrap();

        let out_of_range = service.receive_chunk(&request.hash, 2, &data[..36]).await;
        assert!(matches!(out_of_range, Err(AppError::BadRequest(_))));

        let oversized = service.receive_chunk(&request.hash, 0, &data).await;
        assert!(matches!(oversized, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_recover_restarts_interrupted_assembly() {
        let temp_dir = TempDir::new().unwrap();
        let data = b"abcdefgh".to_vec();
        let request = interrupted_upload(&temp_dir, &data).await;

        let service = service_on(&temp_dir, file_pool(&temp_dir).await);
        assert_eq!(service.recover().await.unwrap(), 1);

        let done = wait_for_terminal(&service, &request.hash).await;
        assert_eq!(done.status, FileStatus::Complete);
        assert!(service.public_url(&request.hash).await.is_ok());
    }

    #[tokio::test]
    async fn test_reregistration_restarts_orphaned_assembly() {
        let temp_dir = TempDir::new().unwrap();
        let data = b"abcdefgh".to_vec();
        let request = interrupted_upload(&temp_dir, &data).await;

        let service = service_on(&temp_dir, file_pool(&temp_dir).await);
        let attached = service.start_upload(&request).await.unwrap();
        assert_eq!(attached.status, FileStatus::Processing);

        let done = wait_for_terminal(&service, &request.hash).await;
        assert_eq!(done.status, FileStatus::Complete);
        assert_eq!(stored_objects(&temp_dir), 1);
    }

    #[tokio::test]
    async fn test_drain_waits_for_assembly() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir).await;
        let data = b"abcdefgh".to_vec();
        let request = start_request(&data, 4);
        service.start_upload(&request).await.unwrap();

        service.receive_chunk(&request.hash, 0, &data[..4]).await.unwrap();
        service.receive_chunk(&request.hash, 1, &data[4..]).await.unwrap();
        service.drain().await;

        let info = service.query(&request.hash).await.unwrap();
        assert_eq!(info.status, FileStatus::Complete);
    }

    #[tokio::test]
    async fn test_chunk_cleanup_failure_keeps_file_complete() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir).await;
        let data = b"abcdefgh".to_vec();
        let request = start_request(&data, 4);
        service.start_upload(&request).await.unwrap();

        // remove_file cannot delete a directory
        let stuck = temp_dir.path().join("chunks").join(&request.hash).join("stuck");
        tokio::fs::create_dir_all(&stuck).await.unwrap();

        service.receive_chunk(&request.hash, 0, &data[..4]).await.unwrap();
        service.receive_chunk(&request.hash, 1, &data[4..]).await.unwrap();

        let done = wait_for_terminal(&service, &request.hash).await;
        assert_eq!(done.status, FileStatus::Complete);
        assert!(service.public_url(&request.hash).await.is_ok());
        assert_eq!(stored_objects(&temp_dir), 1);
    }

    #[tokio::test]
    async fn test_concurrent_chunks_assemble_once() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir).await;
        let data: Vec<u8> = (0..64u32).map(|i| (i * 7 % 256) as u8).collect();
        let request = start_request(&data, 4);
        service.start_upload(&request).await.unwrap();

        let mut sends = JoinSet::new();
        for (index, chunk) in data.chunks(4).enumerate() {
            let service = service.clone();
            let hash = request.hash.clone();
            let chunk = chunk.to_vec();
            sends.spawn(async move { service.receive_chunk(&hash, index as i64, &chunk).await });
        }
        while let Some(joined) = sends.join_next().await {
            joined.unwrap().unwrap();
        }

        service.drain().await;
        let done = wait_for_terminal(&service, &request.hash).await;
        assert_eq!(done.status, FileStatus::Complete);
        assert_eq!(done.current_index, request.chunk_nums);
        assert_eq!(stored_objects(&temp_dir), 1);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("paper.pdf"), "paper.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name(".."), "file");
    }
}
