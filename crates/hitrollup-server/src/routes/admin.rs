use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use hitrollup_core::dimension::ReindexTarget;

use crate::error::AppError;
use crate::state::AppState;

/// `POST /api/admin/cache/reset`: flush the hit-count and ref-count caches.
#[tracing::instrument(skip(state))]
pub async fn reset_cache(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.caches.reset();
    tracing::info!("Stats caches reset");
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct ReindexRequest {
    pub targets: Vec<String>,
    pub since: Option<String>,
    pub until: Option<String>,
}

fn parse_day(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    raw.map(|raw| {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| AppError::bad_field(field, format!("{field} must be YYYY-MM-DD")))
    })
    .transpose()
}

/// `POST /api/admin/reindex`: rebuild dimensions from raw hits.
///
/// Body: `{ "targets": ["hit_counts"], "since": "2024-01-01", "until": "2024-01-31" }`.
/// `since` and `until` are optional.
#[tracing::instrument(skip(state, req))]
pub async fn reindex(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReindexRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.targets.is_empty() {
        return Err(AppError::bad_field("targets", "at least one target is required"));
    }
    let targets = ReindexTarget::parse_list(&req.targets)?;
    let since = parse_day("since", req.since.as_deref())?;
    let until = parse_day("until", req.until.as_deref())?;
    if let (Some(since), Some(until)) = (since, until) {
        if since > until {
            return Err(AppError::bad_field("since", "since must not be after until"));
        }
    }

    let summary = state.reindex(since, until, &targets).await?;
    Ok(Json(json!({ "data": summary })))
}
