//! Chunkline Server
//!
//! Receiving side of the resumable chunked upload protocol: registers
//! uploads by content fingerprint, accepts chunks in any order, tracks the
//! contiguous resume cursor and assembles verified files into the object store.

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let max_segment_size = state.config().upload.max_segment_size;

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/v1/health", get(routes::health::health_check))
        .nest("/v1/files", routes::files::router(max_segment_size))
        .nest("/v1/objects", routes::objects::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
