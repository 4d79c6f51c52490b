//! File Upload Routes
//!
//! HTTP endpoints for the segmented upload protocol.
//!
//! Endpoints:
//! - POST /v1/files/start - Register an upload (idempotent)
//! - POST /v1/files/chunk - Upload one chunk (multipart: chunk, hash, chunkIndex)
//! - GET /v1/files/:hash - File status and resume cursor
//! - GET /v1/files/:hash/public_url - Retrieval URL once complete

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::upload::{FileInfo, PublicUrlResponse, StartUploadRequest};

/// Multipart framing allowance on top of the chunk payload
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the files router
pub fn router(max_segment_size: u64) -> Router<AppState> {
    let chunk_limit = max_segment_size as usize + MULTIPART_OVERHEAD;

    Router::new()
        .route("/start", post(start_upload))
        .route(
            "/chunk",
            post(upload_chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/:hash", get(query_file))
        .route("/:hash/public_url", get(public_url))
}

/// POST /v1/files/start
async fn start_upload(
    State(state): State<AppState>,
    Json(request): Json<StartUploadRequest>,
) -> Result<Json<FileInfo>> {
    let info = state.files().start_upload(&request).await?;
    Ok(Json(info))
}

/// POST /v1/files/chunk
async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileInfo>> {
    let mut chunk: Option<Bytes> = None;
    let mut hash: Option<String> = None;
    let mut chunk_index: Option<i64> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("chunk") => chunk = Some(field.bytes().await?),
            Some("hash") => hash = Some(field.text().await?.trim().to_string()),
            Some("chunkIndex") => {
                let raw = field.text().await?;
                let parsed = raw.trim().parse::<i64>().map_err(|_| {
                    AppError::BadRequest(format!("chunkIndex is not an integer: {}", raw))
                })?;
                chunk_index = Some(parsed);
            }
            _ => {}
        }
    }

    let chunk = chunk.ok_or_else(|| AppError::BadRequest("missing field: chunk".to_string()))?;
    let hash = hash.ok_or_else(|| AppError::BadRequest("missing field: hash".to_string()))?;
    let chunk_index = chunk_index
        .ok_or_else(|| AppError::BadRequest("missing field: chunkIndex".to_string()))?;

    let info = state.files().receive_chunk(&hash, chunk_index, &chunk).await?;
    Ok(Json(info))
}

/// GET /v1/files/:hash
async fn query_file(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<FileInfo>> {
    let info = state.files().query(&hash).await?;
    Ok(Json(info))
}

/// GET /v1/files/:hash/public_url
async fn public_url(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<PublicUrlResponse>> {
    let url = state.files().public_url(&hash).await?;
    Ok(Json(PublicUrlResponse { url }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum_test::TestServer;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::create_pool;
    use crate::state::AppState;
    use crate::storage::LocalBlobStore;
    use crate::upload::{compute_hash, FileInfo, FileStatus, PublicUrlResponse};

    const BOUNDARY: &str = "chunkline-test-boundary";

    async fn test_state(temp_dir: &TempDir) -> AppState {
        let config = Config::with_data_dir(temp_dir.path());
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let blobs = Arc::new(LocalBlobStore::new(
            temp_dir.path().join("objects"),
            &config.server.public_base_url,
        ));
        AppState::new(config, pool, blobs)
    }

    fn chunk_request(hash: &str, chunk_index: i64, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"hash\"\r\n\r\n{hash}\r\n\
                 --{b}\r\nContent-Disposition: form-data; name=\"chunkIndex\"\r\n\r\n{index}\r\n\
                 --{b}\r\nContent-Disposition: form-data; name=\"chunk\"; filename=\"blob\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                b = BOUNDARY,
                hash = hash,
                index = chunk_index,
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/v1/files/chunk")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn read_info(response: axum::response::Response) -> FileInfo {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let server = TestServer::new(crate::router(test_state(&temp_dir).await)).unwrap();

        let response = server.get(&format!("/v1/files/{}", "ab".repeat(32))).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_validates_input() {
        let temp_dir = TempDir::new().unwrap();
        let server = TestServer::new(crate::router(test_state(&temp_dir).await)).unwrap();

        let response = server
            .post("/v1/files/start")
            .json(&json!({
                "hash": "ab".repeat(32),
                "fileName": "paper.pdf",
                "chunkNums": 5,
                "segmentSize": 0
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_then_query() {
        let temp_dir = TempDir::new().unwrap();
        let server = TestServer::new(crate::router(test_state(&temp_dir).await)).unwrap();
        let hash = "cd".repeat(32);

        let body = json!({
            "hash": hash,
            "fileName": "paper.pdf",
            "chunkNums": 5,
            "segmentSize": 2048
        });
        let first = server.post("/v1/files/start").json(&body).await;
        assert_eq!(first.status_code(), StatusCode::OK);
        let second = server.post("/v1/files/start").json(&body).await;
        assert_eq!(second.status_code(), StatusCode::OK);

        let info: FileInfo = server.get(&format!("/v1/files/{}", hash)).await.json();
        assert_eq!(info.status, FileStatus::Pending);
        assert_eq!(info.current_index, 0);
        assert_eq!(info.chunk_nums, 5);

        let url = server.get(&format!("/v1/files/{}/public_url", hash)).await;
        assert_eq!(url.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_multipart_chunks_complete_file() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(&temp_dir).await;
        let app = crate::router(state.clone());

        let data: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();
        let hash = compute_hash(&data);
        state
            .files()
            .start_upload(&crate::upload::StartUploadRequest {
                hash: hash.clone(),
                file_name: "paper.pdf".to_string(),
                chunk_nums: 2,
                segment_size: 2048,
            })
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(chunk_request(&hash, 1, &data[2048..]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_info(response).await.current_index, 0);

        let response = app
            .clone()
            .oneshot(chunk_request(&hash, 0, &data[..2048]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_info(response).await.current_index, 2);

        let mut status = FileStatus::Processing;
        for _ in 0..200 {
            status = state.files().query(&hash).await.unwrap().status;
            if status == FileStatus::Complete {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, FileStatus::Complete);

        let server = TestServer::new(app).unwrap();
        let url: PublicUrlResponse = server
            .get(&format!("/v1/files/{}/public_url", hash))
            .await
            .json();
        let path = url
            .url
            .strip_prefix(&state.config().server.public_base_url)
            .unwrap()
            .to_string();

        let object = server.get(&path).await;
        assert_eq!(object.status_code(), StatusCode::OK);
        assert_eq!(object.as_bytes().to_vec(), data);
    }

    #[tokio::test]
    async fn test_chunk_for_unknown_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let app = crate::router(test_state(&temp_dir).await);

        let response = app
            .oneshot(chunk_request(&"ef".repeat(32), 0, b"data"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
