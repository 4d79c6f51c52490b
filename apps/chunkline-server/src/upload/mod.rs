//! Segmented Upload Module
//!
//! Implements the storage side of resumable, content-addressed uploads:
//! - Files are identified by the SHA-256 fingerprint of their content
//! - Registration is idempotent; re-registering attaches to the existing record
//! - Chunks are stored by (fingerprint, index) and may arrive in any order
//! - The resume cursor is the lowest chunk index not yet received
//!
//! Protocol Flow:
//! 1. Client queries the file state by fingerprint (404 = start fresh)
//! 2. Client registers the upload with its chunk count and segment size
//! 3. Client sends the chunks it still needs, in parallel
//! 4. Server assembles, verifies and stores the file, then reports it complete

pub mod chunk_store;
pub mod locks;
pub mod service;
pub mod types;

pub use chunk_store::{compute_hash, ChunkStore};
pub use locks::FingerprintLocks;
pub use service::FileService;
pub use types::*;
