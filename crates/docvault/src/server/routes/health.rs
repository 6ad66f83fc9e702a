//! Health, readiness and service info endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::health::HealthReport;
use crate::server::state::AppState;

/// GET /health - Point-in-time service and host status
///
/// Answers 503 with the same body when any check is unhealthy.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health().report().await;

    let status = if report.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, Json(report))
}

/// GET /ready - Metadata store answers a ping
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.health().ready().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not_ready", "error": e.to_string() })),
            )
        }
    }
}

/// GET /info - Service description
pub async fn info() -> Json<Value> {
    Json(json!({
        "name": crate::NAME,
        "version": crate::VERSION,
        "description": "Document storage service with filesystem blobs and SQLite metadata",
        "endpoints": {
            "POST /documents": "Upload a document (multipart: file, name)",
            "GET /documents": "List documents (query: skip, limit, status)",
            "GET /documents/:id": "Get document details",
            "GET /documents/:id/download": "Download the stored file",
            "POST /documents/:id/verify": "Check the stored file and update status",
            "DELETE /documents/:id": "Delete a document and its file",
            "GET /health": "Service and host health",
            "GET /ready": "Readiness probe"
        }
    }))
}
