// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    BUDGET_EXHAUSTED,
    REQUESTS_TOTAL,
    REQUEST_DURATION,
    SSE_CONNECTIONS,
    SSE_EVENTS,
    TOKENS_TOTAL,
    TOOL_PARSE_DEGRADATIONS,
    TRANSLATION_ERRORS,
    UPSTREAM_CALLS,
    UPSTREAM_DURATION,
    UPSTREAM_RETRIES,
};

/// Helper to record request metrics
pub fn record_request(method: &str, endpoint: &str, status_code: u16, model: &str, duration_secs: f64) {
    let status = status_code.to_string();
    REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status, model])
        .inc();

    REQUEST_DURATION
        .with_label_values(&[method, endpoint, &status])
        .observe(duration_secs);
}

/// Helper to record the final outcome of one logical upstream call
pub fn record_upstream_call(endpoint_kind: &str, outcome: &str, streaming: bool, duration_secs: f64) {
    UPSTREAM_CALLS
        .with_label_values(&[endpoint_kind, outcome])
        .inc();

    UPSTREAM_DURATION
        .with_label_values(&[endpoint_kind, &streaming.to_string()])
        .observe(duration_secs);
}

pub fn record_retry(endpoint_kind: &str, reason: &str) {
    UPSTREAM_RETRIES.with_label_values(&[endpoint_kind, reason]).inc();
}

pub fn record_budget_exhausted(endpoint_kind: &str) {
    BUDGET_EXHAUSTED.with_label_values(&[endpoint_kind]).inc();
}

/// Helper to record token usage
pub fn record_tokens(model: &str, input: u32, output: u32, cached_input: u32) {
    for (kind, count) in [("input", input), ("output", output), ("cached_input", cached_input)] {
        if count > 0 {
            TOKENS_TOTAL
                .with_label_values(&[model, kind])
                .inc_by(count as f64);
        }
    }
}

/// Helper to record SSE events
pub fn record_sse_event(event_type: &str, model: &str) {
    SSE_EVENTS.with_label_values(&[event_type, model]).inc();
}

pub fn record_sse_connection(status: &str) {
    SSE_CONNECTIONS.with_label_values(&[status]).inc();
}

/// Helper to record translation errors
pub fn record_translation_error(direction: &str, error_type: &str) {
    TRANSLATION_ERRORS.with_label_values(&[direction, error_type]).inc();
}

pub fn record_tool_parse_degradation(mode: &str) {
    TOOL_PARSE_DEGRADATIONS.with_label_values(&[mode]).inc();
}
