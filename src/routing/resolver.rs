// Endpoint resolver: configuration → RoutingDescriptor
// Author: kelexine (https://github.com/kelexine)

use super::{EndpointKind, Provider, RoutingDescriptor};
use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};
use reqwest::Url;
use tracing::debug;

/// Resolve the upstream configuration into a routing descriptor.
///
/// The override map is consulted first (exact match on the normalized base
/// URL); only when it has no entry are the hostname/path heuristics applied.
pub fn resolve(upstream: &UpstreamConfig) -> Result<RoutingDescriptor> {
    let configured = Provider::from_id(&upstream.provider).ok_or_else(|| {
        ProxyError::Configuration(format!(
            "Unknown provider '{}'. Expected one of: {}",
            upstream.provider,
            Provider::ALL.map(|p| p.id()).join(", ")
        ))
    })?;

    let raw_url = select_base_url(configured, upstream)?;
    let url = Url::parse(&raw_url)
        .map_err(|e| ProxyError::Configuration(format!("Malformed base URL '{}': {}", raw_url, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::Configuration(format!(
            "Base URL '{}' must use http or https",
            raw_url
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| ProxyError::Configuration(format!("Base URL '{}' has no host", raw_url)))?
        .to_string();

    let base_url = normalize(&raw_url);

    let endpoint_kind = match lookup_override(upstream, &base_url) {
        Some(kind) => {
            debug!("Endpoint override matched {} -> {}", base_url, kind);
            kind
        }
        None => classify(&url),
    };

    // A custom URL pointing at a known domain still gets that provider's headers
    let provider = match configured {
        Provider::Custom => Provider::from_host(&host),
        named => named,
    };

    let credential = upstream.api_key.clone().filter(|key| !key.is_empty());
    if credential.is_none() && configured != Provider::Custom {
        return Err(ProxyError::Configuration(format!(
            "No API key configured for provider '{}'",
            configured
        )));
    }

    let auth_header_name = match endpoint_kind {
        EndpointKind::AnthropicNative => "x-api-key",
        EndpointKind::OpenAICompatible => "Authorization",
    };

    debug!(
        "Resolved upstream: provider={}, base_url={}, kind={}",
        provider, base_url, endpoint_kind
    );

    Ok(RoutingDescriptor {
        provider,
        models_endpoint_urls: provider.models_url_candidates(&base_url, endpoint_kind),
        extra_headers: provider.extra_headers(),
        base_url,
        endpoint_kind,
        auth_header_name,
        credential,
    })
}

fn select_base_url(provider: Provider, upstream: &UpstreamConfig) -> Result<String> {
    if let Some(url) = upstream.base_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        return Ok(url.to_string());
    }

    if let Some(default) = provider.default_base_url() {
        return Ok(default.to_string());
    }

    // Custom without a URL: a single override entry names the endpoint
    let mut overrides = upstream.endpoint_overrides.keys();
    match (overrides.next(), overrides.next()) {
        (Some(url), None) => Ok(url.clone()),
        (None, _) => Err(ProxyError::Configuration(
            "Custom provider requires a base_url or an endpoint override".to_string(),
        )),
        (Some(_), Some(_)) => Err(ProxyError::Configuration(
            "Custom provider has no base_url and several endpoint overrides; set base_url".to_string(),
        )),
    }
}

fn lookup_override(upstream: &UpstreamConfig, base_url: &str) -> Option<EndpointKind> {
    upstream
        .endpoint_overrides
        .iter()
        .find(|(url, _)| normalize(url) == base_url)
        .map(|(_, kind)| *kind)
}

/// Ordered heuristics for URLs without an override.
fn classify(url: &Url) -> EndpointKind {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if host == "anthropic.com" || host.ends_with(".anthropic.com") {
        return EndpointKind::AnthropicNative;
    }

    let has_anthropic_segment = url
        .path_segments()
        .map(|mut segments| segments.any(|s| s.eq_ignore_ascii_case("anthropic")))
        .unwrap_or(false);
    if has_anthropic_segment {
        return EndpointKind::AnthropicNative;
    }

    EndpointKind::OpenAICompatible
}

fn normalize(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
