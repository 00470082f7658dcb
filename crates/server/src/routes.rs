//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check for load balancers/k8s probes
        .route("/health", get(handlers::health_check))
        .route("/v1/capabilities", get(handlers::get_capabilities))
        // Tilesets
        .route(
            "/tilesets",
            post(handlers::create_tileset).get(handlers::list_tilesets),
        )
        .route("/tilesets/import", post(handlers::import_tileset))
        .route(
            "/tilesets/{tileset_id}",
            get(handlers::get_tileset)
                .put(handlers::update_tileset)
                .delete(handlers::delete_tileset),
        )
        .route(
            "/tilesets/{tileset_id}/{z}/{x}/{y}",
            get(handlers::get_tile),
        )
        // Imports
        .route("/imports", get(handlers::list_imports))
        .route("/imports/{import_id}", get(handlers::get_import))
        .route(
            "/imports/progress/{import_id}",
            get(handlers::import_progress),
        )
        // Styles
        .route("/styles", get(handlers::list_styles))
        .route(
            "/styles/{style_id}",
            get(handlers::get_style).delete(handlers::delete_style),
        );

    let mut router = Router::new().merge(api_routes);

    // When enabled, this endpoint should be network-restricted to the
    // Prometheus scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
