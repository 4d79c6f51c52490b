//! Error types for the upload client

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UploadError>;

#[derive(Error, Debug)]
pub enum UploadError {
    /// The local source could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A precondition was violated before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// A collaborator call failed or returned a non-success status
    #[error("Transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The collaborator does not know this fingerprint
    #[error("Unknown fingerprint: {0}")]
    NotFound(String),

    /// The collaborator reported the failed state for this fingerprint
    #[error("Upload failed on the server: {0}")]
    RemoteFailed(String),
}

impl UploadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UploadError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        UploadError::Transport {
            status,
            message: message.into(),
        }
    }

    /// Whether calling the same entry point again can make progress
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::Transport { .. } | UploadError::RemoteFailed(_)
        )
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        UploadError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
