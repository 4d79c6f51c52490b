//! Local filesystem object storage

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{encode_key, BlobStore};
use crate::error::{AppError, Result, StorageError};

/// Objects stored as plain files below a root directory
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || key.is_empty() {
            return Err(AppError::BadRequest(format!("Invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put_file(&self, key: &str, source: &Path, _content_type: &str) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Err(e) = tokio::fs::rename(source, &path).await {
            // Different filesystem: copy next to the target, then rename into place
            tracing::debug!(key = %key, error = %e, "Rename failed, copying object");
            let tmp = path.with_extension("partial");
            tokio::fs::copy(source, &tmp).await?;
            tokio::fs::rename(&tmp, &path).await?;
        }

        tracing::debug!(key = %key, "Stored object locally");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::ObjectNotFound(key.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn public_url(&self, key: &str) -> Result<String> {
        Ok(format!("{}/v1/objects/{}", self.public_base_url, encode_key(key)))
    }
}
