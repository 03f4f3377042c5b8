// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::error::{ProxyError, Result};
use crate::gateway::GatewayResponse;
use crate::metrics;
use crate::models::anthropic::MessagesRequest;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub provider: String,
    pub endpoint_kind: String,
    pub base_url: String,
    pub profiles: usize,
    pub timestamp: String,
}

/// Boundary-only liveness: reports what the gateway is configured to reach.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = state.gateway.config();
    Json(HealthResponse {
        status: "ok".to_string(),
        provider: config.routing.provider.to_string(),
        endpoint_kind: config.routing.endpoint_kind.to_string(),
        base_url: config.routing.base_url.clone(),
        profiles: config.matcher.len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

/// Parse the raw body twice: typed for translation, untyped for pass-through.
fn parse_body(body: &str) -> Result<(MessagesRequest, Value)> {
    debug!(
        "Raw request JSON (first 500 chars): {}",
        body.chars().take(500).collect::<String>()
    );

    let raw: Value = serde_json::from_str(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("JSON deserialization error: {}", e)))?;
    let request: MessagesRequest = serde_json::from_value(raw.clone()).map_err(|e| {
        error!("Failed to deserialize request: {}", e);
        ProxyError::InvalidRequest(format!("JSON deserialization error: {}", e))
    })?;
    Ok((request, raw))
}

/// Handler for /v1/messages endpoint (Anthropic Messages API compatible)
pub async fn messages_handler(State(state): State<AppState>, body: String) -> Response {
    let start = Instant::now();
    let (model, result) = match parse_body(&body) {
        Ok((request, raw)) => {
            info!(
                "Received messages request: model={}, messages={}, stream={}",
                request.model,
                request.messages.len(),
                request.is_streaming()
            );
            let model = request.model.clone();
            (model, state.gateway.messages(request, raw).await)
        }
        Err(e) => ("unknown".to_string(), Err(e)),
    };

    let response = match result {
        Ok(GatewayResponse::Message(message)) => Json(message).into_response(),
        Ok(GatewayResponse::Passthrough(value)) => Json(value).into_response(),
        Ok(GatewayResponse::Stream(events)) => {
            use futures::StreamExt;
            let model = model.clone();
            let sse = events.map(move |event| {
                metrics::record_sse_event(event.name(), &model);
                Ok::<String, std::convert::Infallible>(event.to_sse())
            });
            sse_response(Body::from_stream(sse))
        }
        Ok(GatewayResponse::RawStream(bytes)) => sse_response(Body::from_stream(bytes)),
        Err(e) => {
            error!("Messages request failed: {}", e);
            e.into_response()
        }
    };

    metrics::record_request(
        "POST",
        "/v1/messages",
        response.status().as_u16(),
        &model,
        start.elapsed().as_secs_f64(),
    );
    response
}

fn sse_response(body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream; charset=utf-8"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
    response
}

/// Handler for /v1/messages/count_tokens
pub async fn count_tokens_handler(State(state): State<AppState>, body: String) -> Result<Json<Value>> {
    let (request, raw) = parse_body(&body)?;
    debug!("Counting tokens for model={}", request.model);
    Ok(Json(state.gateway.count_tokens(&request, raw).await?))
}

/// Handler for GET /v1/models
pub async fn models_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    Ok(Json(state.gateway.list_models().await?))
}

/// Client telemetry sink. Accepted and dropped.
pub async fn event_logging_handler(body: String) -> StatusCode {
    debug!("Discarding {} bytes of client telemetry", body.len());
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body_keeps_unknown_fields() {
        let (request, raw) = parse_body(
            r#"{"model":"claude-x","max_tokens":5,"messages":[{"role":"user","content":"hi"}],"metadata":{"user_id":"u"}}"#,
        )
        .unwrap();
        assert_eq!(request.model, "claude-x");
        assert_eq!(raw["metadata"]["user_id"], "u");
    }

    #[test]
    fn test_parse_body_rejects_bad_json() {
        assert!(matches!(parse_body("{not json"), Err(ProxyError::InvalidRequest(_))));
        assert!(matches!(
            parse_body(r#"{"model":"m"}"#),
            Err(ProxyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_sse_headers() {
        let response = sse_response(Body::empty());
        assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream; charset=utf-8");
        assert_eq!(response.headers()[CACHE_CONTROL], "no-cache");
    }
}
