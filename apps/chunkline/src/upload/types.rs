//! Upload types shared by the client components

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UploadError;

// ============================================================================
// Fingerprint
// ============================================================================

/// Length of a hex-encoded SHA-256 fingerprint
pub const FINGERPRINT_LEN: usize = 64;

/// Content-derived identity of a file: lowercase hex SHA-256 of its bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != FINGERPRINT_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(UploadError::Validation(format!(
                "fingerprint must be {} hex characters: {}",
                FINGERPRINT_LEN, s
            )));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

// ============================================================================
// File Status
// ============================================================================

/// Server-side lifecycle of a file, transmitted as an integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FileStatus {
    /// Registered or receiving chunks (0)
    Pending,
    /// All chunks received, assembly in progress (1)
    Processing,
    /// Assembled and retrievable (2)
    Complete,
    /// Assembly failed; re-registering starts over (3)
    Failed,
}

impl FileStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Complete | FileStatus::Failed)
    }
}

impl TryFrom<u8> for FileStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(FileStatus::Pending),
            1 => Ok(FileStatus::Processing),
            2 => Ok(FileStatus::Complete),
            3 => Ok(FileStatus::Failed),
            other => Err(format!("unknown file status code {}", other)),
        }
    }
}

impl From<FileStatus> for u8 {
    fn from(status: FileStatus) -> Self {
        match status {
            FileStatus::Pending => 0,
            FileStatus::Processing => 1,
            FileStatus::Complete => 2,
            FileStatus::Failed => 3,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Complete => "complete",
            FileStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Status record returned by every collaborator call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub hash: Fingerprint,
    pub status: FileStatus,
    /// Resume cursor: lowest chunk index not yet received
    pub current_index: u64,
    #[serde(default)]
    pub chunk_nums: u64,
    #[serde(default)]
    pub segment_size: u64,
}

// ============================================================================
// Wire Types
// ============================================================================

/// Body of `POST /files/start`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadRequest {
    pub hash: Fingerprint,
    pub file_name: String,
    pub chunk_nums: u64,
    pub segment_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicUrlResponse {
    pub url: String,
}

// ============================================================================
// Negotiation and Session
// ============================================================================

/// What the collaborator already knows about a fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    pub fingerprint: Fingerprint,
    pub resume_from: u64,
    pub already_complete: bool,
    /// Status record, absent when the fingerprint was unknown
    pub existing: Option<FileState>,
}

/// Registered upload, threaded through transport and completion checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub fingerprint: Fingerprint,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u64,
    pub segment_size: u64,
    pub resume_from: u64,
}

impl UploadSession {
    /// Number of chunks transport still has to send
    pub fn remaining(&self) -> u64 {
        self.total_chunks.saturating_sub(self.resume_from)
    }
}

/// Result of `Uploader::upload_file`
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub fingerprint: Fingerprint,
    pub total_chunks: u64,
    pub resumed_from: u64,
    pub chunks_sent: u64,
    pub already_complete: bool,
    pub final_status: FileStatus,
    pub public_url: Option<String>,
}
