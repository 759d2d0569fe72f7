use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use testpool_driver::DriverRegistry;
use testpool_store::StateStore;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// The HTTP surface (§6): a thin axum layer over the reservation API and
/// persistence. No authentication middleware — left to whatever sits in
/// front of this process.
pub fn build_app(store: Arc<dyn StateStore>, registry: Arc<DriverRegistry>) -> Router {
    let state = AppState { store, registry };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/status", get(handlers::status))
        .route("/api/pool", get(handlers::list_pools))
        .route(
            "/api/pool/:name",
            get(handlers::get_pool).post(handlers::create_pool).delete(handlers::delete_pool),
        )
        .route("/api/pool/:name/acquire", get(handlers::acquire))
        .route("/api/resource/:id/release", get(handlers::release))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
