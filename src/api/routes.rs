//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    get_by_id_handler, get_handler, get_with_id_handler, health_handler,
    invalidate_all_handler, invalidate_by_id_handler, invalidate_handler,
    invalidate_with_id_handler, link_id_handler, link_parameters_handler, put_handler,
    reset_stats_handler, search_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/items", put(put_handler).delete(invalidate_all_handler))
        .route("/items/:key", get(get_handler).delete(invalidate_handler))
        .route(
            "/items/:key/:id",
            get(get_with_id_handler).delete(invalidate_with_id_handler),
        )
        .route("/ids/:id", get(get_by_id_handler).delete(invalidate_by_id_handler))
        .route("/search", post(search_handler))
        .route("/link/id", post(link_id_handler))
        .route("/link/parameters", post(link_parameters_handler))
        .route("/stats", get(stats_handler))
        .route("/stats/reset", post(reset_stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
