//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Middleware switches taken from the server configuration
///
/// No request timeout is applied: a flow must run to completion once it has
/// called the reconciler.
#[derive(Debug, Clone, Copy)]
pub struct RouterOptions {
    pub enable_cors: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self { enable_cors: true }
    }
}

/// Create the main API router
pub fn create_router(state: AppState, options: RouterOptions) -> Router {
    let deployment = "/clusters/:cluster/namespaces/:namespace/deployments/:name";

    let api_routes = Router::new()
        // Clusters
        .route(
            "/clusters",
            get(handlers::list_clusters).post(handlers::create_cluster),
        )
        .route(
            "/clusters/:cluster",
            get(handlers::get_cluster).patch(handlers::update_cluster),
        )
        // Deployments
        .route(
            "/clusters/:cluster/deployments",
            get(handlers::list_deployments).post(handlers::create_deployment),
        )
        .route(
            deployment,
            get(handlers::get_deployment)
                .patch(handlers::update_deployment)
                .delete(handlers::delete_deployment),
        )
        .route(
            &format!("{deployment}/revisions"),
            get(handlers::list_revisions),
        )
        .route(
            &format!("{deployment}/terminate"),
            post(handlers::terminate_deployment),
        )
        .route(
            &format!("{deployment}/sync_status"),
            post(handlers::sync_status),
        );

    let router = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if options.enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
