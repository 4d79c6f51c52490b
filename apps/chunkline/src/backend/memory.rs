//! In-process backend for tests
//!
//! Mirrors the collaborator: idempotent registration, overwrite-by-index,
//! contiguous resume cursor and hash verification on completion. Failures
//! can be injected per chunk index and every send is recorded.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::StorageBackend;
use crate::error::{Result, UploadError};
use crate::upload::fingerprint::fingerprint_bytes;
use crate::upload::{FileState, FileStatus, Fingerprint, StartUploadRequest};

struct Record {
    chunk_nums: u64,
    segment_size: u64,
    status: FileStatus,
    chunks: BTreeMap<u64, Vec<u8>>,
}

impl Record {
    fn cursor(&self) -> u64 {
        (0..)
            .take_while(|i| self.chunks.contains_key(i))
            .count() as u64
    }

    fn state(&self, hash: &Fingerprint) -> FileState {
        FileState {
            hash: hash.clone(),
            status: self.status,
            current_index: self.cursor(),
            chunk_nums: self.chunk_nums,
            segment_size: self.segment_size,
        }
    }

    fn finish(&mut self, hash: &Fingerprint) {
        let assembled: Vec<u8> = self.chunks.values().flatten().copied().collect();
        self.status = if &fingerprint_bytes(&assembled) == hash {
            FileStatus::Complete
        } else {
            FileStatus::Failed
        };
    }
}

#[derive(Default)]
pub(crate) struct MemoryBackend {
    files: Mutex<HashMap<Fingerprint, Record>>,
    fail_once: Mutex<HashSet<u64>>,
    delays: Mutex<HashMap<u64, Duration>>,
    sent: Mutex<Vec<u64>>,
    queries: Mutex<usize>,
    status_script: Mutex<Vec<FileStatus>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next send of `index` with a transport error
    pub fn fail_chunk_once(&self, index: u64) {
        self.fail_once.lock().unwrap().insert(index);
    }

    /// Delay the acknowledgement of `index`
    pub fn delay_chunk(&self, index: u64, delay: Duration) {
        self.delays.lock().unwrap().insert(index, delay);
    }

    /// Statuses reported by successive queries before the real one
    pub fn script_statuses(&self, statuses: Vec<FileStatus>) {
        *self.status_script.lock().unwrap() = statuses;
    }

    /// Indices of every chunk send that reached the backend, in arrival order
    pub fn sent(&self) -> Vec<u64> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn queries(&self) -> usize {
        *self.queries.lock().unwrap()
    }

    pub fn set_status(&self, hash: &Fingerprint, status: FileStatus) {
        if let Some(record) = self.files.lock().unwrap().get_mut(hash) {
            record.status = status;
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn query_file(&self, fingerprint: &Fingerprint) -> Result<FileState> {
        *self.queries.lock().unwrap() += 1;

        let files = self.files.lock().unwrap();
        let record = files
            .get(fingerprint)
            .ok_or_else(|| UploadError::NotFound(fingerprint.to_string()))?;
        let mut state = record.state(fingerprint);

        let mut script = self.status_script.lock().unwrap();
        if !script.is_empty() {
            state.status = script.remove(0);
        }
        Ok(state)
    }

    async fn start_upload(&self, request: &StartUploadRequest) -> Result<FileState> {
        let mut files = self.files.lock().unwrap();

        if let Some(record) = files.get(&request.hash) {
            if record.status != FileStatus::Failed {
                return Ok(record.state(&request.hash));
            }
        }

        let mut record = Record {
            chunk_nums: request.chunk_nums,
            segment_size: request.segment_size,
            status: FileStatus::Pending,
            chunks: BTreeMap::new(),
        };
        if record.chunk_nums == 0 {
            record.finish(&request.hash);
        }

        let state = record.state(&request.hash);
        files.insert(request.hash.clone(), record);
        Ok(state)
    }

    async fn upload_chunk(
        &self,
        fingerprint: &Fingerprint,
        chunk_index: u64,
        payload: Vec<u8>,
    ) -> Result<FileState> {
        let delay = self.delays.lock().unwrap().get(&chunk_index).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.sent.lock().unwrap().push(chunk_index);

        if self.fail_once.lock().unwrap().remove(&chunk_index) {
            return Err(UploadError::transport(Some(503), "injected failure"));
        }

        let mut files = self.files.lock().unwrap();
        let record = files
            .get_mut(fingerprint)
            .ok_or_else(|| UploadError::transport(Some(404), "file not registered"))?;

        if chunk_index >= record.chunk_nums {
            return Err(UploadError::transport(Some(400), "chunk index out of range"));
        }

        if record.status == FileStatus::Pending {
            record.chunks.insert(chunk_index, payload);
            if record.cursor() == record.chunk_nums {
                record.finish(fingerprint);
            }
        }

        Ok(record.state(fingerprint))
    }

    async fn public_url(&self, fingerprint: &Fingerprint) -> Result<String> {
        let files = self.files.lock().unwrap();
        match files.get(fingerprint) {
            Some(record) if record.status == FileStatus::Complete => {
                Ok(format!("memory://files/{}", fingerprint))
            }
            _ => Err(UploadError::transport(Some(404), "file not uploaded yet")),
        }
    }
}
