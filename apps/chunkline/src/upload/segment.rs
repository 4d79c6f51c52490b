//! Segmenter
//!
//! Splits a file of known size into fixed-size byte ranges. The last chunk is
//! clamped to the file size; a zero-byte file has no chunks at all.

use crate::error::{Result, UploadError};

/// Half-open byte range `[start, end)` of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBounds {
    pub index: u64,
    pub start: u64,
    pub end: u64,
}

impl ChunkBounds {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    pub file_size: u64,
    pub segment_size: u64,
    pub total_chunks: u64,
}

impl SegmentPlan {
    /// Bounds of chunk `index`, or `None` past the last chunk
    pub fn bounds(&self, index: u64) -> Option<ChunkBounds> {
        if index >= self.total_chunks {
            return None;
        }
        let start = index * self.segment_size;
        let end = (start + self.segment_size).min(self.file_size);
        Some(ChunkBounds { index, start, end })
    }

    /// Chunks `[from, total_chunks)` in index order
    pub fn remaining(&self, from: u64) -> impl Iterator<Item = ChunkBounds> + '_ {
        (from..self.total_chunks).filter_map(move |index| self.bounds(index))
    }

    pub fn chunks(&self) -> Vec<ChunkBounds> {
        self.remaining(0).collect()
    }
}

/// Plan the chunks of a `file_size`-byte file
pub fn plan(file_size: u64, segment_size: u64) -> Result<SegmentPlan> {
    if segment_size == 0 {
        return Err(UploadError::Validation(
            "segment size must be positive".to_string(),
        ));
    }

    Ok(SegmentPlan {
        file_size,
        segment_size,
        total_chunks: file_size.div_ceil(segment_size),
    })
}
