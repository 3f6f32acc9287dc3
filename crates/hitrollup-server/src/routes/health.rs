use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /health`: liveness check.
///
/// Returns `200 OK` when DuckDB is reachable and `503 Service Unavailable`
/// otherwise. `last_drain` is the RFC 3339 completion time of the last drain
/// cycle, or `null` before the first one finishes.
///
/// Response shape:
/// ```json
/// { "status": "ok", "version": "0.1.0", "last_drain": "2024-03-01T10:00:00Z" }
/// ```
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let last_drain = state.last_drain.get().map(|at| at.to_rfc3339());
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "last_drain": last_drain,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Health check: DuckDB unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "version": env!("CARGO_PKG_VERSION"),
                    "last_drain": last_drain,
                })),
            )
                .into_response()
        }
    }
}
