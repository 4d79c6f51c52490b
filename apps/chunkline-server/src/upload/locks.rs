//! Per-fingerprint locking
//!
//! Every state transition of a file record happens while holding the lock
//! for its fingerprint, so concurrent chunk acknowledgements for one file
//! are serialized while different files proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct FingerprintLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl FingerprintLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `hash`, waiting for any current holder
    pub async fn lock(&self, hash: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.inner.lock().await;
            // Drop entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(hash.to_string()).or_default().clone()
        };

        entry.lock_owned().await
    }

    /// Number of fingerprints currently tracked
    pub async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}
