use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::state::AppState;

/// Hex SHA-256 of a bearer token. Tokens are compared by digest so the time a
/// comparison takes does not depend on how much of the raw token matched.
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Guard for `/api/admin/*`.
///
/// Answers 404 when no admin token is configured and 401 when the bearer
/// token is missing or wrong.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(AppError::NotFound("admin routes are disabled".to_string()));
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let authorized = matches!(provided, Some(token) if hash_token(token) == hash_token(expected));
    if !authorized {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}
