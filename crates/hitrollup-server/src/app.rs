use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{auth, routes, state::AppState};

/// Construct the Axum [`Router`] for the health and admin surface.
///
/// `TraceLayer` logs every request through `tracing`. Everything under
/// `/api/admin` sits behind the bearer-token guard.
pub fn build_app(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/cache/reset", post(routes::admin::reset_cache))
        .route("/reindex", post(routes::admin::reindex))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_admin,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api/admin", admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
