//! File record database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::upload::FileStatus;

/// Durable file record, one per fingerprint
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub hash: String,
    pub file_name: String,
    pub status: i64,
    pub chunk_nums: i64,
    pub current_index: i64,
    pub segment_size: i64,
    pub object_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// File repository
pub struct FileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the record for a fingerprint
    pub async fn get(&self, hash: &str) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT hash, file_name, status, chunk_nums, current_index,
                   segment_size, object_key, created_at, updated_at
            FROM files
            WHERE hash = ?
            "#,
        )
        .bind(hash)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// Create a pending record, replacing any previous one for the fingerprint
    pub async fn create(
        &self,
        hash: &str,
        file_name: &str,
        chunk_nums: i64,
        segment_size: i64,
    ) -> Result<FileRecord> {
        let now = Utc::now().to_rfc3339();

        sqlx::query("DELETE FROM file_chunks WHERE hash = ?")
            .bind(hash)
            .execute(self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO files (hash, file_name, status, chunk_nums, current_index,
                               segment_size, object_key, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, NULL, ?, ?)
            ON CONFLICT(hash) DO UPDATE SET
                file_name = excluded.file_name,
                status = excluded.status,
                chunk_nums = excluded.chunk_nums,
                current_index = 0,
                segment_size = excluded.segment_size,
                object_key = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(hash)
        .bind(file_name)
        .bind(FileStatus::Pending.code())
        .bind(chunk_nums)
        .bind(segment_size)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.require(hash).await
    }

    /// Record a received chunk; a repeated index overwrites the previous row
    pub async fn record_chunk(&self, hash: &str, chunk_index: i64, size: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO file_chunks (hash, chunk_index, size, received_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(hash, chunk_index) DO UPDATE SET
                size = excluded.size,
                received_at = excluded.received_at
            "#,
        )
        .bind(hash)
        .bind(chunk_index)
        .bind(size)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Whether a chunk index has been durably received
    pub async fn has_chunk(&self, hash: &str, chunk_index: i64) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM file_chunks WHERE hash = ? AND chunk_index = ?",
        )
        .bind(hash)
        .bind(chunk_index)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Move the resume cursor past every received chunk starting at `from`.
    /// The cursor only moves forward, so lookups amortize to one per chunk.
    pub async fn advance_cursor(&self, hash: &str, from: i64, limit: i64) -> Result<i64> {
        let mut cursor = from;
        while cursor < limit && self.has_chunk(hash, cursor).await? {
            cursor += 1;
        }
        Ok(cursor)
    }

    /// Fingerprints of every record in `status`
    pub async fn hashes_with_status(&self, status: FileStatus) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT hash FROM files WHERE status = ? ORDER BY updated_at ASC")
                .bind(status.code())
                .fetch_all(self.pool)
                .await?;

        Ok(rows.into_iter().map(|(hash,)| hash).collect())
    }

    /// Update status and resume cursor
    pub async fn update_progress(
        &self,
        hash: &str,
        status: FileStatus,
        current_index: i64,
    ) -> Result<FileRecord> {
        sqlx::query(
            "UPDATE files SET status = ?, current_index = ?, updated_at = ? WHERE hash = ?",
        )
        .bind(status.code())
        .bind(current_index)
        .bind(Utc::now().to_rfc3339())
        .bind(hash)
        .execute(self.pool)
        .await?;

        self.require(hash).await
    }

    /// Mark a file assembled and stored under `object_key`
    pub async fn mark_complete(&self, hash: &str, object_key: &str) -> Result<FileRecord> {
        sqlx::query(
            "UPDATE files SET status = ?, object_key = ?, updated_at = ? WHERE hash = ?",
        )
        .bind(FileStatus::Complete.code())
        .bind(object_key)
        .bind(Utc::now().to_rfc3339())
        .bind(hash)
        .execute(self.pool)
        .await?;

        self.require(hash).await
    }

    /// Mark a file as failed
    pub async fn mark_failed(&self, hash: &str) -> Result<FileRecord> {
        self.set_status(hash, FileStatus::Failed).await
    }

    /// Forget the received chunk rows of a file
    pub async fn clear_chunks(&self, hash: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM file_chunks WHERE hash = ?")
            .bind(hash)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn set_status(&self, hash: &str, status: FileStatus) -> Result<FileRecord> {
        sqlx::query("UPDATE files SET status = ?, updated_at = ? WHERE hash = ?")
            .bind(status.code())
            .bind(Utc::now().to_rfc3339())
            .bind(hash)
            .execute(self.pool)
            .await?;

        self.require(hash).await
    }

    async fn require(&self, hash: &str) -> Result<FileRecord> {
        self.get(hash)
            .await?
            .ok_or_else(|| crate::error::AppError::NotFound(format!("File not found: {}", hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;

    const HASH: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[tokio::test]
    async fn test_create_and_get() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = FileRepository::new(&pool);

        assert!(repo.get(HASH).await.unwrap().is_none());

        let record = repo.create(HASH, "paper.pdf", 5, 2048).await.unwrap();
        assert_eq!(record.status, FileStatus::Pending.code());
        assert_eq!(record.current_index, 0);
        assert_eq!(record.chunk_nums, 5);
        assert!(record.object_key.is_none());
    }

    #[tokio::test]
    async fn test_record_chunk_is_idempotent() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = FileRepository::new(&pool);
        repo.create(HASH, "paper.pdf", 5, 2048).await.unwrap();

        repo.record_chunk(HASH, 2, 2048).await.unwrap();
        repo.record_chunk(HASH, 0, 2048).await.unwrap();
        repo.record_chunk(HASH, 2, 2048).await.unwrap();

        assert!(repo.has_chunk(HASH, 0).await.unwrap());
        assert!(!repo.has_chunk(HASH, 1).await.unwrap());
        assert!(repo.has_chunk(HASH, 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_advance_cursor_stops_at_gap_and_limit() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = FileRepository::new(&pool);
        repo.create(HASH, "paper.pdf", 5, 2048).await.unwrap();

        assert_eq!(repo.advance_cursor(HASH, 0, 5).await.unwrap(), 0);

        for index in [0, 1, 3, 4] {
            repo.record_chunk(HASH, index, 2048).await.unwrap();
        }
        assert_eq!(repo.advance_cursor(HASH, 0, 5).await.unwrap(), 2);

        repo.record_chunk(HASH, 2, 2048).await.unwrap();
        assert_eq!(repo.advance_cursor(HASH, 2, 5).await.unwrap(), 5);
        assert_eq!(repo.advance_cursor(HASH, 0, 3).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_hashes_with_status() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = FileRepository::new(&pool);
        let other = "f".repeat(64);
        repo.create(HASH, "paper.pdf", 1, 2048).await.unwrap();
        repo.create(&other, "notes.txt", 1, 2048).await.unwrap();
        repo.update_progress(&other, FileStatus::Processing, 1).await.unwrap();

        let processing = repo.hashes_with_status(FileStatus::Processing).await.unwrap();
        assert_eq!(processing, vec![other]);
    }

    #[tokio::test]
    async fn test_create_resets_previous_record() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = FileRepository::new(&pool);
        repo.create(HASH, "paper.pdf", 5, 2048).await.unwrap();
        repo.record_chunk(HASH, 0, 2048).await.unwrap();
        repo.mark_failed(HASH).await.unwrap();

        let record = repo.create(HASH, "paper.pdf", 5, 2048).await.unwrap();
        assert_eq!(record.status, FileStatus::Pending.code());
        assert!(!repo.has_chunk(HASH, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_complete() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = FileRepository::new(&pool);
        repo.create(HASH, "paper.pdf", 1, 2048).await.unwrap();

        let record = repo.mark_complete(HASH, "files/x-paper.pdf").await.unwrap();
        assert_eq!(record.status, FileStatus::Complete.code());
        assert_eq!(record.object_key.as_deref(), Some("files/x-paper.pdf"));
    }
}
