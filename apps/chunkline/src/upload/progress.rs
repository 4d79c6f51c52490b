//! Progress events for uploads

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use super::types::Fingerprint;

/// Events emitted while an upload runs
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Content fingerprint computed.
    Fingerprinted { fingerprint: Fingerprint, size: u64 },
    /// Session registered (or found complete) on the collaborator.
    Negotiated {
        fingerprint: Fingerprint,
        total_chunks: u64,
        resume_from: u64,
        already_complete: bool,
    },
    /// One chunk send was acknowledged.
    ChunkAcknowledged {
        index: u64,
        acknowledged: u64,
        total: u64,
        percent: u8,
    },
    /// Upload finished.
    Completed {
        fingerprint: Fingerprint,
        public_url: Option<String>,
    },
}

/// Callback for upload events.
///
/// Invoked synchronously from the upload task, in acknowledgement order.
pub trait ProgressCallback: Send + Sync {
    fn on_event(&self, event: UploadEvent);
}

/// A no-op progress callback that ignores all events.
pub struct NoOpCallback;

impl ProgressCallback for NoOpCallback {
    fn on_event(&self, _event: UploadEvent) {}
}

/// A function-based progress callback.
pub struct FnCallback<F>
where
    F: Fn(UploadEvent) + Send + Sync,
{
    f: F,
}

impl<F> FnCallback<F>
where
    F: Fn(UploadEvent) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ProgressCallback for FnCallback<F>
where
    F: Fn(UploadEvent) + Send + Sync,
{
    fn on_event(&self, event: UploadEvent) {
        (self.f)(event)
    }
}

/// Helper to create an Arc-wrapped callback from a closure.
pub fn callback<F>(f: F) -> Arc<dyn ProgressCallback>
where
    F: Fn(UploadEvent) + Send + Sync + 'static,
{
    Arc::new(FnCallback::new(f))
}

/// Integer percentage of acknowledged chunks
pub fn percent(acknowledged: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((acknowledged as f64 / total as f64) * 100.0).round() as u8
}

// =============================================================================
// Indicatif-based progress callback
// =============================================================================

/// Renders chunk progress as a terminal progress bar.
pub struct IndicatifCallback {
    bar: ProgressBar,
}

impl IndicatifCallback {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }
}

impl Default for IndicatifCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for IndicatifCallback {
    fn on_event(&self, event: UploadEvent) {
        match event {
            UploadEvent::Fingerprinted { fingerprint, size } => {
                self.bar
                    .set_message(format!("{} ({} bytes)", &fingerprint.as_str()[..12], size));
            }
            UploadEvent::Negotiated {
                total_chunks,
                resume_from,
                already_complete,
                ..
            } => {
                self.bar.set_length(total_chunks);
                self.bar.set_position(resume_from.min(total_chunks));
                if already_complete {
                    self.bar.set_message("already uploaded");
                } else if resume_from > 0 {
                    self.bar.set_message(format!("resuming at chunk {}", resume_from));
                }
            }
            UploadEvent::ChunkAcknowledged { acknowledged, .. } => {
                self.bar.set_position(acknowledged);
            }
            UploadEvent::Completed { public_url, .. } => {
                let message = if public_url.is_some() { "done" } else { "sent" };
                self.bar.finish_with_message(message);
            }
        }
    }
}
