//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::error::Result;
use crate::storage::{BlobStore, LocalBlobStore, S3Client};
use crate::upload::{ChunkStore, FileService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    blobs: Arc<dyn BlobStore>,
    files: FileService,
}

impl AppState {
    /// Create application state with an explicit object store
    pub fn new(config: Config, db: SqlitePool, blobs: Arc<dyn BlobStore>) -> Self {
        let chunks = ChunkStore::with_local_storage(config.storage.data_dir.clone());
        let files = FileService::new(
            db.clone(),
            chunks,
            blobs.clone(),
            config.upload.max_segment_size,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                blobs,
                files,
            }),
        }
    }

    /// Create application state with the object store named by the configuration
    pub async fn from_config(config: Config, db: SqlitePool) -> Result<Self> {
        let blobs: Arc<dyn BlobStore> = match &config.storage.s3 {
            Some(s3) if config.storage.provider.is_object_store() => {
                let client = S3Client::new(s3, config.storage.url_expiry_secs).await?;
                tracing::info!(bucket = %client.bucket(), "Using S3-compatible object store");
                Arc::new(client)
            }
            _ => {
                let root = config.storage.data_dir.join("objects");
                tracing::info!(root = %root.display(), "Using local object store");
                Arc::new(LocalBlobStore::new(root, &config.server.public_base_url))
            }
        };

        let state = Self::new(config, db, blobs);
        let resumed = state.files().recover().await?;
        if resumed > 0 {
            tracing::info!(count = resumed, "Resumed interrupted assemblies");
        }

        Ok(state)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the object store
    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.inner.blobs
    }

    /// Get the file service
    pub fn files(&self) -> &FileService {
        &self.inner.files
    }
}
