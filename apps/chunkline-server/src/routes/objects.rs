//! Object serving routes
//!
//! Serves assembled files from the configured object store. Retrieval URLs
//! for the local store point here.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::storage::guess_content_type;

/// Create the objects router
pub fn router() -> Router<AppState> {
    Router::new().route("/*key", get(serve_object))
}

/// GET /v1/objects/*key
async fn serve_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response> {
    let data = state.blobs().get_object(&key).await?;

    let filename = key.rsplit('/').next().unwrap_or(&key);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, guess_content_type(&key))
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", filename),
        )
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(e.to_string()))
}
