//! Configuration management for the upload client

use std::env;
use std::time::Duration;

use crate::upload::UploadOptions;

/// Default segment size (2MB)
pub const DEFAULT_SEGMENT_SIZE: u64 = 2 * 1024 * 1024;

/// Default delay between status polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the collaborator API, including the version prefix
    pub server_url: String,
    pub segment_size: u64,
    /// Maximum chunk sends in flight; 0 dispatches every remaining chunk at once
    pub parallel: usize,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000/v1".to_string(),
            segment_size: DEFAULT_SEGMENT_SIZE,
            parallel: 0,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Read `CHUNKLINE_*` variables, falling back to defaults for unset or invalid values
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_url: env::var("CHUNKLINE_SERVER_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.server_url),
            segment_size: parse_var("CHUNKLINE_SEGMENT_SIZE").unwrap_or(defaults.segment_size),
            parallel: parse_var("CHUNKLINE_PARALLEL").unwrap_or(defaults.parallel),
            poll_interval: parse_var("CHUNKLINE_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            timeout: parse_var("CHUNKLINE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Upload behaviour derived from this configuration
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            segment_size: self.segment_size,
            parallel: self.parallel,
            poll_interval: self.poll_interval,
            wait_for_completion: true,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
