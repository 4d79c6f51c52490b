//! Upload Module
//!
//! Client side of the resumable, content-addressed chunked upload protocol.
//!
//! Flow:
//! 1. Fingerprint the full content (SHA-256)
//! 2. Negotiate: ask the collaborator what it already holds
//! 3. Register the session and plan the remaining chunks
//! 4. Send the remaining chunks concurrently, reporting progress per ack
//! 5. Poll until the collaborator reports the assembled file

pub mod fingerprint;
pub mod negotiate;
pub mod poller;
pub mod progress;
pub mod segment;
pub mod source;
pub mod transport;
pub mod types;
pub mod uploader;

pub use fingerprint::{fingerprint, fingerprint_bytes, fingerprint_reader};
pub use negotiate::SessionNegotiator;
pub use poller::{PollHandle, StatusPoller};
pub use progress::{
    callback, FnCallback, IndicatifCallback, NoOpCallback, ProgressCallback, UploadEvent,
};
pub use segment::{plan, ChunkBounds, SegmentPlan};
pub use source::ChunkSource;
pub use transport::ChunkTransport;
pub use types::*;
pub use uploader::{UploadOptions, Uploader};
