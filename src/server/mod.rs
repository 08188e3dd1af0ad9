pub mod handlers;
pub mod logging;
pub mod middleware;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;

use self::handlers::AppState;

/// Largest accepted request body; inline media is base64 in JSON.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Build the axum router.
///
/// Authentication runs inside each handler so unknown paths (404) and wrong
/// methods (405) are answered before any key is checked.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::models))
        .route("/chat/completions", post(handlers::chat_completions))
        .route("/embeddings", post(handlers::embeddings))
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum_middleware::from_fn(logging::logging_middleware))
        .with_state(state)
}
