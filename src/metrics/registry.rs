// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry, CounterVec, Encoder,
    HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use tracing::error;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // REQUEST METRICS
    // ============================================================================

    /// Total number of inbound API requests
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("requests_total", "Total number of API requests"),
        &["method", "endpoint", "status_code", "model"],
        REGISTRY
    ).unwrap();

    /// Request duration histogram
    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        HistogramOpts::new("request_duration_seconds", "Request duration in seconds")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint", "status_code"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // UPSTREAM METRICS
    // ============================================================================

    /// Logical upstream calls by final outcome
    pub static ref UPSTREAM_CALLS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("upstream_calls_total", "Total upstream calls by outcome"),
        &["endpoint_kind", "outcome"], // outcome: success, or the error type (timeout_error, budget_exceeded_error, rate_limit_error, api_error, ...)
        REGISTRY
    ).unwrap();

    /// Upstream call duration, retries included
    pub static ref UPSTREAM_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        HistogramOpts::new("upstream_duration_seconds", "Upstream call duration including retries")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["endpoint_kind", "streaming"],
        REGISTRY
    ).unwrap();

    /// Retried attempts
    pub static ref UPSTREAM_RETRIES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("upstream_retries_total", "Total retried upstream attempts"),
        &["endpoint_kind", "reason"], // reason: rate_limited, server_error, timeout, network
        REGISTRY
    ).unwrap();

    /// Calls that ran out of overall budget
    pub static ref BUDGET_EXHAUSTED: CounterVec = register_counter_vec_with_registry!(
        Opts::new("upstream_budget_exhausted_total", "Upstream calls that exceeded their overall budget"),
        &["endpoint_kind"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // TOKEN METRICS
    // ============================================================================

    /// Total tokens reported by upstreams
    pub static ref TOKENS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("tokens_total", "Total tokens processed"),
        &["model", "type"], // type: input, output, cached_input
        REGISTRY
    ).unwrap();

    // ============================================================================
    // STREAMING METRICS
    // ============================================================================

    /// SSE events sent
    pub static ref SSE_EVENTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("sse_events_total", "Total SSE events sent"),
        &["event_type", "model"],
        REGISTRY
    ).unwrap();

    /// SSE connection events
    pub static ref SSE_CONNECTIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("sse_connections_total", "Total SSE connections"),
        &["status"], // status: opened, completed, failed
        REGISTRY
    ).unwrap();

    // ============================================================================
    // TRANSLATION METRICS
    // ============================================================================

    /// Translation errors
    pub static ref TRANSLATION_ERRORS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("translation_errors_total", "Total translation errors"),
        &["direction", "error_type"], // direction: request, response, stream
        REGISTRY
    ).unwrap();

    /// Tool calls that degraded to text or raw arguments
    pub static ref TOOL_PARSE_DEGRADATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("tool_parse_degradations_total", "Tool calls that could not be fully parsed"),
        &["mode"], // mode: native, xml
        REGISTRY
    ).unwrap();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        REQUESTS_TOTAL
            .with_label_values(&["POST", "/v1/messages", "200", "m"])
            .inc();
        UPSTREAM_CALLS
            .with_label_values(&["openai-compatible", "success"])
            .inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("requests_total"));
        assert!(metrics.contains("upstream_calls_total"));
    }
}
