mod health;

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::transport;

/// Build the full application router: the engine endpoint under the
/// configured context path plus the health routes.
pub fn router(state: AppState) -> Router {
    let config = state.engine.config();
    let context = config.context_path.clone();
    let entry = any(transport::engine_entry).layer(DefaultBodyLimit::max(config.max_payload_bytes));

    let mut router = Router::new()
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .route(&format!("{context}/"), entry.clone());
    // Clients differ on whether they send the trailing slash.
    if !context.is_empty() {
        router = router.route(&context, entry);
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
