//! API routes for the document server

pub mod documents;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Room for multipart boundaries and the `name` field on top of the file
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build document routes
pub fn document_routes(max_upload_size: usize) -> Router<AppState> {
    let body_limit = DefaultBodyLimit::max(max_upload_size.saturating_add(MULTIPART_OVERHEAD));

    Router::new()
        .route(
            "/documents",
            get(documents::list_documents)
                .post(documents::upload_document)
                .layer(body_limit),
        )
        .route(
            "/documents/",
            get(documents::list_documents)
                .post(documents::upload_document)
                .layer(body_limit),
        )
        .route(
            "/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/documents/:id/download", get(documents::download_document))
        .route("/documents/:id/verify", post(documents::verify_document))
}

/// Build health and info routes
pub fn service_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .route("/info", get(health::info))
}
