//! API router

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{charge_points, commands, health, metrics};
use super::middleware::http_metrics_middleware;
use crate::application::SharedCommandSender;
use crate::domain::RepositoryProvider;
use crate::session::SharedSessionRegistry;

/// State shared by every API handler
#[derive(Clone)]
pub struct ApiState {
    pub session_registry: SharedSessionRegistry,
    pub command_sender: SharedCommandSender,
    pub repos: Arc<dyn RepositoryProvider>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(
        session_registry: SharedSessionRegistry,
        command_sender: SharedCommandSender,
        repos: Arc<dyn RepositoryProvider>,
    ) -> Self {
        Self {
            session_registry,
            command_sender,
            repos,
            started_at: Instant::now(),
        }
    }
}

/// Build the API router. `/metrics` is mounted only when a Prometheus
/// recorder handle is supplied.
pub fn create_api_router(state: ApiState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let charge_point_routes = Router::new()
        .route("/", get(charge_points::list_charge_points))
        .route(
            "/{charge_point_id}/transactions",
            get(charge_points::list_transactions),
        )
        .route("/{charge_point_id}/remote-start", post(commands::remote_start))
        .route("/{charge_point_id}/remote-stop", post(commands::remote_stop));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1/charge-points", charge_point_routes)
        .with_state(state);

    if let Some(handle) = metrics_handle {
        router = router.merge(
            Router::new()
                .route("/metrics", get(metrics::prometheus_metrics))
                .with_state(handle),
        );
    }

    router
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
