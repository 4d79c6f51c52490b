//! Upload types for the segmented upload protocol

use serde::{Deserialize, Serialize};

use crate::db::FileRecord;
use crate::error::AppError;

// ============================================================================
// Constants
// ============================================================================

/// Length of a hex-encoded SHA-256 fingerprint
pub const FINGERPRINT_LEN: usize = 64;

// ============================================================================
// File Status
// ============================================================================

/// Lifecycle of a file record, stored and transmitted as an integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum FileStatus {
    /// Registered, waiting for (more) chunks
    Pending,
    /// Every chunk received, assembly running
    Processing,
    /// Assembled and stored
    Complete,
    /// Assembly failed (hash mismatch or storage failure)
    Failed,
}

impl FileStatus {
    pub fn code(self) -> i64 {
        match self {
            FileStatus::Pending => 0,
            FileStatus::Processing => 1,
            FileStatus::Complete => 2,
            FileStatus::Failed => 3,
        }
    }

    /// Chunk writes are only meaningful while the file is still pending
    pub fn accepts_chunks(self) -> bool {
        matches!(self, FileStatus::Pending)
    }
}

impl TryFrom<i64> for FileStatus {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(FileStatus::Pending),
            1 => Ok(FileStatus::Processing),
            2 => Ok(FileStatus::Complete),
            3 => Ok(FileStatus::Failed),
            other => Err(format!("unknown file status code {}", other)),
        }
    }
}

impl From<FileStatus> for i64 {
    fn from(status: FileStatus) -> Self {
        status.code()
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

/// Body of `POST /files/start`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadRequest {
    /// Content fingerprint of the complete file
    pub hash: String,

    /// Original file name
    pub file_name: String,

    /// Total number of chunks the client will send
    pub chunk_nums: i64,

    /// Segment size used to split the file
    pub segment_size: i64,
}

impl StartUploadRequest {
    /// Reject malformed registrations before touching any state
    pub fn validate(&self, max_segment_size: u64) -> Result<(), AppError> {
        if !is_valid_fingerprint(&self.hash) {
            return Err(AppError::BadRequest(format!(
                "hash must be {} lowercase hex characters",
                FINGERPRINT_LEN
            )));
        }
        if self.segment_size <= 0 {
            return Err(AppError::BadRequest("segmentSize must be positive".to_string()));
        }
        if self.segment_size as u64 > max_segment_size {
            return Err(AppError::BadRequest(format!(
                "segmentSize {} exceeds maximum {}",
                self.segment_size, max_segment_size
            )));
        }
        if self.chunk_nums < 0 {
            return Err(AppError::BadRequest("chunkNums must not be negative".to_string()));
        }
        if self.file_name.trim().is_empty() {
            return Err(AppError::BadRequest("fileName must not be empty".to_string()));
        }
        Ok(())
    }
}

/// File state as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub hash: String,
    pub status: FileStatus,
    /// Lowest chunk index not yet received
    pub current_index: i64,
    pub chunk_nums: i64,
    pub segment_size: i64,
}

impl TryFrom<&FileRecord> for FileInfo {
    type Error = AppError;

    fn try_from(record: &FileRecord) -> Result<Self, Self::Error> {
        Ok(FileInfo {
            hash: record.hash.clone(),
            status: FileStatus::try_from(record.status).map_err(AppError::Internal)?,
            current_index: record.current_index,
            chunk_nums: record.chunk_nums,
            segment_size: record.segment_size,
        })
    }
}

/// Body of `GET /files/{hash}/public_url`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUrlResponse {
    pub url: String,
}

// ============================================================================
// Helpers
// ============================================================================

/// Check a fingerprint is a lowercase hex SHA-256 digest
pub fn is_valid_fingerprint(hash: &str) -> bool {
    hash.len() == FINGERPRINT_LEN
        && hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
