//! HTTP backend over reqwest

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, Response, StatusCode};

use super::StorageBackend;
use crate::error::{Result, UploadError};
use crate::upload::{FileState, Fingerprint, PublicUrlResponse, StartUploadRequest};

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// `base_url` includes the version prefix, e.g. `http://localhost:3000/v1`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/files{}", self.base_url, path)
    }

    /// Map non-success responses onto the error taxonomy
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(UploadError::transport(
            Some(status.as_u16()),
            format!("server returned {}: {}", status, body),
        ))
    }
}

#[async_trait]
impl StorageBackend for HttpBackend {
    async fn query_file(&self, fingerprint: &Fingerprint) -> Result<FileState> {
        let response = self
            .client
            .get(self.url(&format!("/{}", fingerprint)))
            .send()
            .await?;

        // Only a status query reads 404 as "never registered"
        if response.status() == StatusCode::NOT_FOUND {
            return Err(UploadError::NotFound(fingerprint.to_string()));
        }
        Ok(Self::check(response).await?.json().await?)
    }

    async fn start_upload(&self, request: &StartUploadRequest) -> Result<FileState> {
        let response = self
            .client
            .post(self.url("/start"))
            .json(request)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn upload_chunk(
        &self,
        fingerprint: &Fingerprint,
        chunk_index: u64,
        payload: Vec<u8>,
    ) -> Result<FileState> {
        let chunk = multipart::Part::bytes(payload)
            .file_name("blob")
            .mime_str("application/octet-stream")?;
        let form = multipart::Form::new()
            .text("hash", fingerprint.to_string())
            .text("chunkIndex", chunk_index.to_string())
            .part("chunk", chunk);

        let response = self
            .client
            .post(self.url("/chunk"))
            .multipart(form)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn public_url(&self, fingerprint: &Fingerprint) -> Result<String> {
        let response = self
            .client
            .get(self.url(&format!("/{}/public_url", fingerprint)))
            .send()
            .await?;

        let body: PublicUrlResponse = Self::check(response).await?.json().await?;
        Ok(body.url)
    }
}
