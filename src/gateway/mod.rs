//! Request orchestration.
//!
//! The [`Gateway`] owns the immutable [`GatewayConfig`] and the upstream
//! client. For each inbound request it maps the model, selects a capability
//! profile, translates and transforms the request, calls the upstream through
//! the budget controller, and translates the answer back (single-shot or as
//! an SSE event stream).
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::capability::CapabilityMatcher;
use crate::config::{AppConfig, ModelMappingConfig, PerformanceConfig};
use crate::error::{ProxyError, Result};
use crate::metrics;
use crate::models::anthropic::{CountTokensResponse, MessagesRequest, MessagesResponse};
use crate::models::map_model;
use crate::models::openai::{ChatCompletionRequest, ModelList};
use crate::models::streaming::StreamEvent;
use crate::routing::{self, EndpointKind, RoutingDescriptor};
use crate::tools::{rewrite_request_for_xml, ToolMode, XmlToolParser};
use crate::transform::{Pipeline, TransformOptions};
use crate::translation::{translate_request, translate_response, StreamTranslator, TranslationContext};
use crate::upstream::{ByteStream, ChunkStream, UpstreamClient};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Translated SSE events for one response.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Everything the orchestrator reads. Compiled once from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub routing: RoutingDescriptor,
    pub matcher: CapabilityMatcher,
    pub models: ModelMappingConfig,
    pub retry: crate::config::RetryConfig,
    /// Upstream silence before a `ping` is sent.
    pub keepalive: Duration,
}

impl GatewayConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            routing: routing::resolve(&config.upstream)?,
            matcher: CapabilityMatcher::from_config(&config.capabilities)?,
            models: config.models.clone(),
            retry: config.retry.clone(),
            keepalive: Duration::from_secs(config.performance.keepalive_ping_secs.max(1)),
        })
    }
}

/// Outcome of a `/v1/messages` call.
pub enum GatewayResponse {
    /// Translated single-shot message.
    Message(MessagesResponse),
    /// Anthropic-native body, forwarded as-is.
    Passthrough(Value),
    /// Translated event stream.
    Stream(EventStream),
    /// Anthropic-native SSE bytes, forwarded as-is.
    RawStream(ByteStream),
}

/// The request orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    upstream: UpstreamClient,
}

impl Gateway {
    pub fn new(config: GatewayConfig, performance: &PerformanceConfig) -> Result<Self> {
        let upstream = UpstreamClient::new(config.routing.clone(), config.retry.clone(), performance)?;
        Ok(Self {
            config: Arc::new(config),
            upstream,
        })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        Self::new(GatewayConfig::from_app_config(config)?, &config.performance)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    fn backend_model(&self, request: &MessagesRequest) -> String {
        map_model(&request.model, request.thinking_budget().is_some(), &self.config.models)
    }

    /// Handle one Messages request. `raw` is the original body, forwarded
    /// untouched (apart from the model) to Anthropic-native endpoints.
    pub async fn messages(&self, request: MessagesRequest, raw: Value) -> Result<GatewayResponse> {
        let model = self.backend_model(&request);
        info!(
            "Routing {} -> {} via {} ({})",
            request.model, model, self.config.routing.provider, self.config.routing.endpoint_kind
        );

        match self.config.routing.endpoint_kind {
            EndpointKind::AnthropicNative => {
                let body = with_model(raw, &model);
                if request.is_streaming() {
                    Ok(GatewayResponse::RawStream(self.upstream.messages_stream(&body).await?))
                } else {
                    Ok(GatewayResponse::Passthrough(self.upstream.messages(&body).await?))
                }
            }
            EndpointKind::OpenAICompatible => {
                let (outbound, ctx) = self.prepare(&request, &model)?;
                if request.is_streaming() {
                    let chunks = self.upstream.chat_completion_stream(&outbound).await?;
                    let translator = StreamTranslator::new(ctx);
                    Ok(GatewayResponse::Stream(Box::pin(drive_stream(
                        chunks,
                        translator,
                        self.config.keepalive,
                    ))))
                } else {
                    let response = self.upstream.chat_completion(&outbound).await?;
                    let message = translate_response(response, &ctx).map_err(|e| {
                        metrics::record_translation_error("response", e.error_type());
                        e
                    })?;
                    metrics::record_tokens(
                        &message.model,
                        message.usage.input_tokens,
                        message.usage.output_tokens,
                        message.usage.cache_read_input_tokens,
                    );
                    Ok(GatewayResponse::Message(message))
                }
            }
        }
    }

    /// Build the outbound chat-completions request and the context the
    /// response side needs: translate, run the pipeline forward, then apply
    /// the tool mode.
    pub fn prepare(&self, request: &MessagesRequest, model: &str) -> Result<(ChatCompletionRequest, TranslationContext)> {
        let profile = self.config.matcher.match_model(model);
        let opts = TransformOptions {
            max_tokens_override: profile.max_tokens_override,
            thinking_budget: request.thinking_budget(),
        };
        let pipeline = Pipeline::new(&profile.transformers, opts);

        let translated = translate_request(request, model).map_err(|e| {
            metrics::record_translation_error("request", e.error_type());
            e
        })?;
        let mut outbound = pipeline.forward(translated);

        let tool_mode = ToolMode::select(profile.needs_xml_tools, request.has_tools());
        let xml_parser = if profile.needs_xml_tools {
            let declared = rewrite_request_for_xml(&mut outbound);
            XmlToolParser::new(&declared)
        } else {
            XmlToolParser::default()
        };

        debug!(
            "Prepared request: profile={}, tool_mode={:?}, transformers={:?}",
            profile.model_pattern, tool_mode, profile.transformers
        );

        let ctx = TranslationContext::new(request.model.clone(), pipeline, tool_mode, xml_parser);
        Ok((outbound, ctx))
    }

    /// `count_tokens`: forwarded to Anthropic-native endpoints, estimated
    /// (characters / 4) otherwise.
    pub async fn count_tokens(&self, request: &MessagesRequest, raw: Value) -> Result<Value> {
        match self.config.routing.endpoint_kind {
            EndpointKind::AnthropicNative => {
                let body = with_model(raw, &self.backend_model(request));
                self.upstream.count_tokens(&body).await
            }
            EndpointKind::OpenAICompatible => Ok(serde_json::to_value(estimate_tokens(request)?)?),
        }
    }

    /// Upstream model listing in the Anthropic list shape.
    pub async fn list_models(&self) -> Result<Value> {
        let list = self.upstream.list_models().await?;
        Ok(anthropic_model_list(list))
    }
}

/// Drive a [`StreamTranslator`] over an upstream chunk stream.
///
/// A `ping` is emitted after `keepalive` without upstream data. An upstream
/// error is folded into the event stream. Dropping the returned stream drops
/// the upstream response.
pub fn drive_stream(
    upstream: ChunkStream,
    mut translator: StreamTranslator,
    keepalive: Duration,
) -> impl Stream<Item = StreamEvent> + Send {
    use futures::StreamExt;

    async_stream::stream! {
        metrics::record_sse_connection("opened");
        for event in translator.begin() {
            yield event;
        }

        let mut upstream = upstream;
        let mut chunk_count = 0usize;
        let mut failed = false;

        loop {
            tokio::select! {
                next = upstream.next() => {
                    match next {
                        Some(Ok(chunk)) => {
                            chunk_count += 1;
                            for event in translator.translate_chunk(chunk) {
                                yield event;
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Upstream stream failed after {} chunks: {}", chunk_count, e);
                            failed = true;
                            for event in translator.fail(e.error_type(), &e.to_string()) {
                                yield event;
                            }
                            break;
                        }
                        None => {
                            for event in translator.finish() {
                                yield event;
                            }
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(keepalive) => {
                    debug!("Yielding Keep-Alive Ping");
                    yield StreamEvent::Ping;
                }
            }
        }

        let usage = translator.usage();
        metrics::record_tokens(
            translator.model(),
            usage.input_tokens,
            usage.output_tokens,
            usage.cache_read_input_tokens,
        );
        metrics::record_sse_connection(if failed { "failed" } else { "completed" });
        debug!("SSE stream ended after {} chunks", chunk_count);
    }
}

fn with_model(mut raw: Value, model: &str) -> Value {
    if let Some(obj) = raw.as_object_mut() {
        obj.insert("model".to_string(), Value::String(model.to_string()));
    }
    raw
}

/// Rough input-token estimate: four characters per token.
pub fn estimate_tokens(request: &MessagesRequest) -> Result<CountTokensResponse> {
    let mut chars = serde_json::to_string(&request.messages)?.chars().count();
    if let Some(system) = &request.system {
        chars += system.to_text().chars().count();
    }
    if let Some(tools) = &request.tools {
        chars += serde_json::to_string(tools)?.chars().count();
    }

    let input_tokens = u32::try_from(chars / 4)
        .map_err(|_| ProxyError::InvalidRequest("Request too large to count".to_string()))?;
    Ok(CountTokensResponse {
        input_tokens: input_tokens.max(1),
    })
}

fn anthropic_model_list(list: ModelList) -> Value {
    let data: Vec<Value> = list
        .data
        .into_iter()
        .map(|entry| {
            let created_at = entry
                .created
                .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
                .map(|dt| dt.to_rfc3339());
            json!({
                "type": "model",
                "display_name": entry.display_name.or(entry.name).unwrap_or_else(|| entry.id.clone()),
                "id": entry.id,
                "created_at": created_at,
            })
        })
        .collect();

    let first_id = data.first().and_then(|m| m.get("id").cloned());
    let last_id = data.last().and_then(|m| m.get("id").cloned());
    json!({
        "data": data,
        "has_more": false,
        "first_id": first_id,
        "last_id": last_id,
    })
}
