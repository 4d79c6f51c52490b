//! Status Poller
//!
//! Queries a fingerprint's status on a fixed interval until the collaborator
//! reports a terminal state. Every observed status is broadcast to all
//! subscribers; polls for one subscription never overlap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::types::{FileState, FileStatus, Fingerprint};
use crate::backend::StorageBackend;
use crate::error::{Result, UploadError};

const EVENT_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct StatusPoller {
    backend: Arc<dyn StorageBackend>,
    interval: Duration,
    events: broadcast::Sender<FileState>,
}

impl StatusPoller {
    pub fn new(backend: Arc<dyn StorageBackend>, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            interval,
            events,
        }
    }

    /// Receive every status this poller observes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<FileState> {
        self.events.subscribe()
    }

    /// Poll until `Complete` (returned) or `Failed` (an error)
    pub async fn await_completion(&self, fingerprint: &Fingerprint) -> Result<FileState> {
        loop {
            let state = self.backend.query_file(fingerprint).await?;

            // No subscribers is fine
            let _ = self.events.send(state.clone());

            match state.status {
                FileStatus::Complete => return Ok(state),
                FileStatus::Failed => {
                    return Err(UploadError::RemoteFailed(fingerprint.to_string()))
                }
                FileStatus::Pending | FileStatus::Processing => {
                    tracing::trace!(
                        fingerprint = %fingerprint,
                        status = %state.status,
                        current_index = state.current_index,
                        "Waiting for completion"
                    );
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Poll in a background task.
    ///
    /// Cancelling or dropping the handle stops polling; server state is untouched.
    pub fn spawn(&self, fingerprint: Fingerprint) -> PollHandle {
        let (cancel, mut cancelled) = watch::channel(false);
        let poller = self.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                result = poller.await_completion(&fingerprint) => Some(result),
                _ = cancelled.changed() => {
                    tracing::debug!(fingerprint = %fingerprint, "Polling cancelled");
                    None
                }
            }
        });

        PollHandle { cancel, task }
    }
}

pub struct PollHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<Option<Result<FileState>>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the poll to end; `Ok(None)` when it was cancelled
    pub async fn join(self) -> Result<Option<FileState>> {
        // Keep the sender alive so joining does not cancel
        let PollHandle { cancel, task } = self;
        let outcome = task.await;
        drop(cancel);

        match outcome {
            Ok(Some(result)) => result.map(Some),
            Ok(None) => Ok(None),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Ok(None),
        }
    }
}
