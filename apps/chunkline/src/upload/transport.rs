//! Chunk Transport
//!
//! Fans the remaining chunks of a session out to the collaborator and fans
//! the acknowledgements back in. Acks may arrive in any order; the
//! acknowledged counter is only touched by the single consumer of the
//! stream, so the reported percentage never goes backwards.
//!
//! The first failed send fails the whole call. In-flight sends are dropped
//! and nothing is rolled back: whatever the collaborator acknowledged stays
//! valid for the next attempt.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::Semaphore;

use super::progress::{percent, ProgressCallback, UploadEvent};
use super::segment::{self, ChunkBounds};
use super::source::ChunkSource;
use super::types::UploadSession;
use crate::backend::StorageBackend;
use crate::error::{Result, UploadError};

/// Local chunk reads allowed at once, each holding an open file
const MAX_CONCURRENT_READS: usize = 16;

#[derive(Clone)]
pub struct ChunkTransport {
    backend: Arc<dyn StorageBackend>,
    /// Maximum sends in flight; 0 dispatches the whole remaining range
    parallel: usize,
    reads: Arc<Semaphore>,
}

impl ChunkTransport {
    pub fn new(backend: Arc<dyn StorageBackend>, parallel: usize) -> Self {
        Self {
            backend,
            parallel,
            reads: Arc::new(Semaphore::new(MAX_CONCURRENT_READS)),
        }
    }

    /// Send chunks `[resume_from, total_chunks)` and return how many were sent
    pub async fn send_remaining(
        &self,
        session: &UploadSession,
        source: &ChunkSource,
        progress: &dyn ProgressCallback,
    ) -> Result<u64> {
        let plan = segment::plan(session.file_size, session.segment_size)?;
        let remaining = session.remaining();
        if remaining == 0 {
            return Ok(0);
        }

        let in_flight = match self.parallel {
            0 => remaining as usize,
            n => n,
        };

        tracing::debug!(
            fingerprint = %session.fingerprint,
            from = session.resume_from,
            total = session.total_chunks,
            in_flight = in_flight,
            "Sending chunks"
        );

        let mut acks = stream::iter(plan.remaining(session.resume_from))
            .map(|bounds| self.send_chunk(session, source, bounds))
            .buffer_unordered(in_flight);

        let mut acknowledged = session.resume_from;
        let mut sent = 0;

        while let Some(index) = acks.try_next().await? {
            acknowledged += 1;
            sent += 1;

            progress.on_event(UploadEvent::ChunkAcknowledged {
                index,
                acknowledged,
                total: session.total_chunks,
                percent: percent(acknowledged, session.total_chunks),
            });
        }

        Ok(sent)
    }

    async fn send_chunk(
        &self,
        session: &UploadSession,
        source: &ChunkSource,
        bounds: ChunkBounds,
    ) -> Result<u64> {
        let payload = {
            let _permit = self.reads.acquire().await.map_err(|e| {
                UploadError::io(
                    source.display_path(),
                    std::io::Error::new(std::io::ErrorKind::Other, e),
                )
            })?;
            source.read_chunk(&bounds).await?
        };
        let state = self
            .backend
            .upload_chunk(&session.fingerprint, bounds.index, payload)
            .await
            .map_err(|e| {
                tracing::warn!(
                    fingerprint = %session.fingerprint,
                    chunk_index = bounds.index,
                    error = %e,
                    "Chunk send failed"
                );
                e
            })?;

        tracing::trace!(
            chunk_index = bounds.index,
            current_index = state.current_index,
            "Chunk acknowledged"
        );

        Ok(bounds.index)
    }
}
