//! Session Negotiator
//!
//! Decides where an upload starts. An unknown fingerprint and a known but
//! incomplete one are both ordinary outcomes, which keeps every entry point
//! safe to call again after a crash or lost connection.

use std::sync::Arc;

use super::segment::{self, SegmentPlan};
use super::types::{
    FileState, FileStatus, Fingerprint, Negotiation, StartUploadRequest, UploadSession,
};
use crate::backend::StorageBackend;
use crate::error::{Result, UploadError};

#[derive(Clone)]
pub struct SessionNegotiator {
    backend: Arc<dyn StorageBackend>,
}

impl SessionNegotiator {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Ask the collaborator what it already holds for `fingerprint`
    pub async fn negotiate(&self, fingerprint: &Fingerprint) -> Result<Negotiation> {
        let existing = match self.backend.query_file(fingerprint).await {
            Ok(state) => Some(state),
            Err(UploadError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let negotiation = match &existing {
            None => Negotiation {
                fingerprint: fingerprint.clone(),
                resume_from: 0,
                already_complete: false,
                existing: None,
            },
            Some(state) => Negotiation {
                fingerprint: fingerprint.clone(),
                resume_from: match state.status {
                    // A failed record is reset by the next registration
                    FileStatus::Failed => 0,
                    _ => state.current_index,
                },
                already_complete: state.status == FileStatus::Complete,
                existing: existing.clone(),
            },
        };

        tracing::debug!(
            fingerprint = %fingerprint,
            known = negotiation.existing.is_some(),
            resume_from = negotiation.resume_from,
            already_complete = negotiation.already_complete,
            "Negotiated upload"
        );

        Ok(negotiation)
    }

    /// Register the session and derive the handle transport works from.
    ///
    /// The registration response is authoritative: when the collaborator
    /// already holds this fingerprint with another segment size, the plan is
    /// rebuilt with the stored size so one file never mixes chunk geometries.
    pub async fn register(
        &self,
        negotiation: &Negotiation,
        file_name: &str,
        plan: &SegmentPlan,
    ) -> Result<UploadSession> {
        let request = StartUploadRequest {
            hash: negotiation.fingerprint.clone(),
            file_name: file_name.to_string(),
            chunk_nums: plan.total_chunks,
            segment_size: plan.segment_size,
        };

        let state = self.backend.start_upload(&request).await?;
        let plan = self.reconcile(plan, &state)?;

        if state.status == FileStatus::Failed {
            return Err(UploadError::RemoteFailed(negotiation.fingerprint.to_string()));
        }

        let resume_from = match state.status {
            FileStatus::Processing | FileStatus::Complete => plan.total_chunks,
            _ => state.current_index.min(plan.total_chunks),
        };

        Ok(UploadSession {
            fingerprint: negotiation.fingerprint.clone(),
            file_name: file_name.to_string(),
            file_size: plan.file_size,
            total_chunks: plan.total_chunks,
            segment_size: plan.segment_size,
            resume_from,
        })
    }

    fn reconcile(&self, plan: &SegmentPlan, state: &FileState) -> Result<SegmentPlan> {
        if state.segment_size == 0 || state.segment_size == plan.segment_size {
            return Ok(*plan);
        }

        tracing::warn!(
            fingerprint = %state.hash,
            requested = plan.segment_size,
            stored = state.segment_size,
            "Server holds this file with a different segment size, adopting it"
        );

        let adopted = segment::plan(plan.file_size, state.segment_size)?;
        if state.chunk_nums != 0 && state.chunk_nums != adopted.total_chunks {
            return Err(UploadError::Validation(format!(
                "server expects {} chunks of {} bytes for {}, file has {}",
                state.chunk_nums, state.segment_size, state.hash, adopted.total_chunks
            )));
        }
        Ok(adopted)
    }
}
