use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::auth::require_identity;
use crate::handler;
use crate::state::AppState;

/// Headroom over the payload limit for multipart framing.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Build the axum router with all gateway endpoints.
pub fn build_router(state: AppState) -> Router {
    let limits = &state.config.limits;
    let push_limit = body_limit(limits.max_push_bytes);
    let push_dir_limit = body_limit(limits.max_push_dir_bytes);

    let authenticated = Router::new()
        .route(
            "/push",
            post(handler::push).layer(DefaultBodyLimit::max(push_limit)),
        )
        .route("/pull", get(handler::pull))
        .route("/list", get(handler::list))
        .route(
            "/push-dir",
            post(handler::push_dir).layer(DefaultBodyLimit::max(push_dir_limit)),
        )
        .route("/pull-dir", get(handler::pull_dir))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    Router::new()
        .route("/health", get(handler::health))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn body_limit(payload: u64) -> usize {
    usize::try_from(payload.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX)
}
