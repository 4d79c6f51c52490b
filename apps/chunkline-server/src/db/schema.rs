//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- One record per distinct file content, keyed by fingerprint
CREATE TABLE IF NOT EXISTS files (
    hash TEXT PRIMARY KEY,
    file_name TEXT NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    chunk_nums INTEGER NOT NULL,
    current_index INTEGER NOT NULL DEFAULT 0,
    segment_size INTEGER NOT NULL,
    object_key TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_files_status ON files(status);

-- Chunk indices durably received for a file
CREATE TABLE IF NOT EXISTS file_chunks (
    hash TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    size INTEGER NOT NULL,
    received_at TEXT NOT NULL,
    PRIMARY KEY (hash, chunk_index)
);
"#;
