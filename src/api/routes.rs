//! API Routes
//!
//! Configures the Axum router with the service and resource endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    bulk_create_handler, bulk_delete_handler, bulk_update_handler, code_handler, count_handler,
    create_handler, delete_handler, get_handler, health_handler, list_handler, search_handler,
    stats_handler, update_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// Static segments (`count`, `search`, `bulk`, `code`) take precedence over
/// `/:resource/:key`, so those words cannot be read back as natural keys.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/:resource", get(list_handler).post(create_handler))
        .route("/:resource/count", get(count_handler))
        .route("/:resource/search", get(search_handler))
        .route("/:resource/code/:code", get(code_handler))
        .route(
            "/:resource/bulk",
            post(bulk_create_handler)
                .put(bulk_update_handler)
                .delete(bulk_delete_handler),
        )
        .route(
            "/:resource/:key",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
