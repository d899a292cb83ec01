use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, orphans, rules, runs};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and status
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        // Run ingest
        .route("/runs", post(runs::report_run).get(runs::list_collecting))
        .route("/backlog", get(runs::list_backlog))
        // Rules
        .route("/rules", get(rules::get_rules).put(rules::replace_rules))
        // Orphaned runs
        .route("/orphans", get(orphans::list_orphans))
        .route(
            "/orphans/{id}",
            get(orphans::get_orphan).delete(orphans::remove_orphan),
        )
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics).with_state(state))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
