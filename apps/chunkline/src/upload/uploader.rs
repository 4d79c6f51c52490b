//! Upload orchestration
//!
//! fingerprint -> negotiate -> segment -> transport -> completion check.
//! The collaborator's status record is the only resume state; calling
//! `upload_file` again after any failure continues where it stopped.

use std::sync::Arc;
use std::time::Duration;

use super::fingerprint::fingerprint;
use super::negotiate::SessionNegotiator;
use super::poller::StatusPoller;
use super::progress::{ProgressCallback, UploadEvent};
use super::segment;
use super::source::ChunkSource;
use super::transport::ChunkTransport;
use super::types::{FileState, FileStatus, Fingerprint, UploadOutcome};
use crate::backend::{HttpBackend, StorageBackend};
use crate::config::ClientConfig;
use crate::error::{Result, UploadError};

/// Per-uploader behaviour
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub segment_size: u64,
    /// Maximum sends in flight; 0 dispatches every remaining chunk at once
    pub parallel: usize,
    pub poll_interval: Duration,
    /// Poll for completion and resolve the retrieval URL after transport
    pub wait_for_completion: bool,
}

#[derive(Clone)]
pub struct Uploader {
    backend: Arc<dyn StorageBackend>,
    options: UploadOptions,
    negotiator: SessionNegotiator,
    transport: ChunkTransport,
    poller: StatusPoller,
}

impl Uploader {
    pub fn new(backend: Arc<dyn StorageBackend>, options: UploadOptions) -> Self {
        Self {
            negotiator: SessionNegotiator::new(backend.clone()),
            transport: ChunkTransport::new(backend.clone(), options.parallel),
            poller: StatusPoller::new(backend.clone(), options.poll_interval),
            backend,
            options,
        }
    }

    /// Uploader talking HTTP to `config.server_url`
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let backend = HttpBackend::new(&config.server_url, config.timeout)?;
        Ok(Self::new(Arc::new(backend), config.upload_options()))
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Poller sharing this uploader's backend and interval
    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    /// Upload `source`, resuming from whatever the collaborator already holds
    pub async fn upload_file(
        &self,
        source: &ChunkSource,
        progress: &dyn ProgressCallback,
    ) -> Result<UploadOutcome> {
        if self.options.segment_size == 0 {
            return Err(UploadError::Validation(
                "segment size must be positive".to_string(),
            ));
        }

        let size = source.size().await?;
        let fingerprint = fingerprint(source).await?;
        progress.on_event(UploadEvent::Fingerprinted {
            fingerprint: fingerprint.clone(),
            size,
        });

        let plan = segment::plan(size, self.options.segment_size)?;
        let negotiation = self.negotiator.negotiate(&fingerprint).await?;

        if negotiation.already_complete {
            let total_chunks = negotiation
                .existing
                .as_ref()
                .map(|state| state.chunk_nums)
                .unwrap_or(plan.total_chunks);

            tracing::info!(fingerprint = %fingerprint, "Already uploaded, skipping transport");
            progress.on_event(UploadEvent::Negotiated {
                fingerprint: fingerprint.clone(),
                total_chunks,
                resume_from: total_chunks,
                already_complete: true,
            });

            let public_url = self.resolve_url(&fingerprint).await?;
            progress.on_event(UploadEvent::Completed {
                fingerprint: fingerprint.clone(),
                public_url: public_url.clone(),
            });

            return Ok(UploadOutcome {
                fingerprint,
                total_chunks,
                resumed_from: total_chunks,
                chunks_sent: 0,
                already_complete: true,
                final_status: FileStatus::Complete,
                public_url,
            });
        }

        let session = self
            .negotiator
            .register(&negotiation, source.name(), &plan)
            .await?;
        progress.on_event(UploadEvent::Negotiated {
            fingerprint: fingerprint.clone(),
            total_chunks: session.total_chunks,
            resume_from: session.resume_from,
            already_complete: false,
        });

        tracing::info!(
            fingerprint = %fingerprint,
            file_name = %session.file_name,
            total_chunks = session.total_chunks,
            resume_from = session.resume_from,
            "Uploading"
        );

        let chunks_sent = self
            .transport
            .send_remaining(&session, source, progress)
            .await?;

        let (final_status, public_url) = if self.options.wait_for_completion {
            let state = self.poller.await_completion(&fingerprint).await?;
            (state.status, self.resolve_url(&fingerprint).await?)
        } else {
            (self.get_resume_state(&fingerprint).await?.status, None)
        };

        tracing::info!(
            fingerprint = %fingerprint,
            chunks_sent = chunks_sent,
            status = %final_status,
            "Upload finished"
        );
        progress.on_event(UploadEvent::Completed {
            fingerprint: fingerprint.clone(),
            public_url: public_url.clone(),
        });

        Ok(UploadOutcome {
            fingerprint,
            total_chunks: session.total_chunks,
            resumed_from: session.resume_from,
            chunks_sent,
            already_complete: false,
            final_status,
            public_url,
        })
    }

    /// Current status and resume cursor of `fingerprint`
    pub async fn get_resume_state(&self, fingerprint: &Fingerprint) -> Result<FileState> {
        self.backend.query_file(fingerprint).await
    }

    pub async fn public_url(&self, fingerprint: &Fingerprint) -> Result<String> {
        self.backend.public_url(fingerprint).await
    }

    async fn resolve_url(&self, fingerprint: &Fingerprint) -> Result<Option<String>> {
        if !self.options.wait_for_completion {
            return Ok(None);
        }
        self.backend.public_url(fingerprint).await.map(Some)
    }
}
