// Upstream HTTP client
// Author: kelexine (https://github.com/kelexine)

use super::streaming::{parse_chunk_stream, passthrough_stream, ByteStream, ChunkStream};
use crate::config::{PerformanceConfig, RetryConfig};
use crate::error::{ProxyError, Result};
use crate::metrics;
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse, ModelList};
use crate::routing::{EndpointKind, RoutingDescriptor};
use crate::utils::logging::sanitize;
use crate::utils::retry::{with_retry, AttemptError, RetryPolicy};
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Anthropic API version sent to native endpoints.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for one configured upstream.
///
/// Every call goes through the retry/budget controller. Completion timeouts
/// bound the time to response headers; streamed bodies are never retried.
#[derive(Clone)]
pub struct UpstreamClient {
    http_client: Client,
    routing: RoutingDescriptor,
    retry: RetryConfig,
}

impl UpstreamClient {
    pub fn new(routing: RoutingDescriptor, retry: RetryConfig, performance: &PerformanceConfig) -> Result<Self> {
        // No client-wide timeout: the budget controller sets one per attempt
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(performance.connection_pool_size)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        debug!("Created HTTP client with connection pooling and keep-alive");

        Ok(Self {
            http_client,
            routing,
            retry,
        })
    }

    pub fn routing(&self) -> &RoutingDescriptor {
        &self.routing
    }

    pub fn endpoint_kind(&self) -> EndpointKind {
        self.routing.endpoint_kind
    }

    fn completion_policy(&self) -> RetryPolicy {
        let timeouts = &self.retry.timeouts;
        let secs = match self.routing.endpoint_kind {
            EndpointKind::AnthropicNative => timeouts.anthropic_native_secs,
            EndpointKind::OpenAICompatible => timeouts.openai_compatible_secs,
        };
        RetryPolicy::from_config(&self.retry, self.routing.endpoint_kind.as_str(), Duration::from_secs(secs))
    }

    fn models_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(
            &self.retry,
            self.routing.endpoint_kind.as_str(),
            Duration::from_secs(self.retry.timeouts.models_secs),
        )
    }

    /// Request with auth and provider headers applied.
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut builder = self.http_client.request(method, url);

        if let Some(value) = self.routing.auth_header_value() {
            builder = builder.header(self.routing.auth_header_name, value);
        }
        if self.routing.endpoint_kind == EndpointKind::AnthropicNative {
            builder = builder.header("anthropic-version", ANTHROPIC_VERSION);
        }
        for (name, value) in &self.routing.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
    }

    fn post_json(&self, url: &str, body: &Bytes, streaming: bool) -> RequestBuilder {
        let builder = self
            .request(Method::POST, url)
            .header("Content-Type", "application/json")
            .body(body.clone());
        if streaming {
            builder.header("Accept", "text/event-stream")
        } else {
            builder
        }
    }

    /// Non-streaming chat completion.
    pub async fn chat_completion(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let url = self.routing.completion_url();
        let body = Bytes::from(serde_json::to_vec(request)?);
        debug!("Calling chat completions at {} for model: {}", url, request.model);

        self.observe(false, self.fetch_json("Chat completion", &self.completion_policy(), || {
            self.post_json(&url, &body, false)
        }))
        .await
    }

    /// Streaming chat completion, retried until response headers arrive.
    pub async fn chat_completion_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream> {
        let url = self.routing.completion_url();
        let body = Bytes::from(serde_json::to_vec(request)?);
        debug!("Starting chat completions stream to: {}", url);

        let response = self
            .observe(true, self.send("Chat completion stream", &self.completion_policy(), || {
                self.post_json(&url, &body, true)
            }))
            .await?;

        Ok(Box::pin(parse_chunk_stream(response.bytes_stream())))
    }

    /// Anthropic-native pass-through, non-streaming.
    pub async fn messages(&self, request: &Value) -> Result<Value> {
        let url = self.routing.completion_url();
        let body = Bytes::from(serde_json::to_vec(request)?);
        debug!("Forwarding messages request to: {}", url);

        self.observe(false, self.fetch_json("Messages", &self.completion_policy(), || {
            self.post_json(&url, &body, false)
        }))
        .await
    }

    /// Anthropic-native pass-through, streaming. Bytes are forwarded untouched.
    pub async fn messages_stream(&self, request: &Value) -> Result<ByteStream> {
        let url = self.routing.completion_url();
        let body = Bytes::from(serde_json::to_vec(request)?);
        debug!("Forwarding messages stream to: {}", url);

        let response = self
            .observe(true, self.send("Messages stream", &self.completion_policy(), || {
                self.post_json(&url, &body, true)
            }))
            .await?;

        Ok(Box::pin(passthrough_stream(response.bytes_stream())))
    }

    /// Forward `count_tokens` to an Anthropic-native endpoint.
    pub async fn count_tokens(&self, request: &Value) -> Result<Value> {
        let url = self.routing.count_tokens_url();
        let body = Bytes::from(serde_json::to_vec(request)?);

        self.fetch_json("Count tokens", &self.models_policy(), || self.post_json(&url, &body, false))
            .await
    }

    /// List upstream models. Candidate URLs are probed in order; a 404 moves
    /// on to the next one.
    pub async fn list_models(&self) -> Result<ModelList> {
        let policy = self.models_policy();
        let mut last_error = None;

        for url in &self.routing.models_endpoint_urls {
            debug!("Listing models via {}", url);
            match self
                .fetch_json::<ModelList, _>("List models", &policy, || self.request(Method::GET, url))
                .await
            {
                Ok(list) => return Ok(list),
                Err(ProxyError::UpstreamHttp { status: 404, body }) => {
                    debug!("No model listing at {}", url);
                    last_error = Some(ProxyError::UpstreamHttp { status: 404, body });
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProxyError::Configuration("No model listing endpoint configured".to_string())
        }))
    }

    /// Verify the upstream answers and return how many models it lists.
    pub async fn check_connectivity(&self) -> Result<usize> {
        let start = Instant::now();
        let models = self.list_models().await?;
        info!(
            "Upstream {} reachable in {}ms ({} models)",
            self.routing.base_url,
            start.elapsed().as_millis(),
            models.data.len()
        );
        Ok(models.data.len())
    }

    /// Send under the budget controller and return the successful response.
    async fn send<F>(&self, name: &str, policy: &RetryPolicy, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        with_retry(name, policy, || {
            let request = build();
            async move { send_once(request).await }
        })
        .await
    }

    /// Send and decode a JSON body. Body read and decode count against the
    /// attempt; a body that does not decode is not retried.
    async fn fetch_json<T, F>(&self, name: &str, policy: &RetryPolicy, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        with_retry(name, policy, || {
            let request = build();
            async move {
                let response = send_once(request).await?;
                let text = response.text().await.map_err(|e| AttemptError::from_reqwest(&e))?;
                serde_json::from_str(&text).map_err(|e| {
                    debug!("Undecodable upstream body: {}", sanitize(&text.chars().take(200).collect::<String>()));
                    AttemptError::Malformed(e.to_string())
                })
            }
        })
        .await
    }

    async fn observe<T>(&self, streaming: bool, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let start = Instant::now();
        let result = call.await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.error_type(),
        };
        metrics::record_upstream_call(
            self.routing.endpoint_kind.as_str(),
            outcome,
            streaming,
            start.elapsed().as_secs_f64(),
        );
        if let Err(e) = &result {
            error!("Upstream call failed: {}", sanitize(&e.to_string()));
        }
        result
    }
}

async fn send_once(request: RequestBuilder) -> std::result::Result<Response, AttemptError> {
    let response = request.send().await.map_err(|e| AttemptError::from_reqwest(&e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body).unwrap_or(body);
    debug!("Upstream returned {}: {}", status, sanitize(&message));
    Err(AttemptError::Status {
        status: status.as_u16(),
        body: message,
    })
}

/// Extract error message from an OpenAI or Anthropic error envelope.
fn extract_error_message(response_text: &str) -> Option<String> {
    #[derive(serde::Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
        #[serde(rename = "type")]
        error_type: Option<String>,
    }

    let error = serde_json::from_str::<ErrorResponse>(response_text).ok()?.error?;
    error.message.or(error.error_type)
}
