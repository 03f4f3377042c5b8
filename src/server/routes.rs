// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{
    count_tokens_handler, event_logging_handler, health_handler, messages_handler, metrics_handler,
    models_handler,
};
use super::middleware::{body_limit_layer, request_id_layers};
use crate::config::PerformanceConfig;
use crate::gateway::Gateway;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
}

pub fn create_router(gateway: Gateway, performance: &PerformanceConfig) -> Router {
    let state = AppState { gateway };

    let (set_request_id, propagate_request_id) = request_id_layers();

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/messages", post(messages_handler))
        .route("/v1/messages/count_tokens", post(count_tokens_handler))
        .route("/v1/models", get(models_handler))
        .route("/api/event_logging/batch", post(event_logging_handler))
        .layer(body_limit_layer(performance.request_body_limit_mb))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state)
}
