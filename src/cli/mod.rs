// CLI module for throne-proxy
// Author: kelexine (https://github.com/kelexine)

use crate::config::{AppConfig, SecretString};
use clap::Parser;
use std::path::PathBuf;

/// throne-proxy - Anthropic Messages API gateway for OpenAI-compatible backends
#[derive(Parser, Debug)]
#[command(name = "throne-proxy", version, about, long_about = None)]
pub struct Args {
    /// Config file (default: ~/.throne-proxy/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Upstream provider (openrouter, openai, together, groq, deepseek, glm, custom)
    #[arg(long, env = "THRONE_PROXY_PROVIDER")]
    pub provider: Option<String>,

    /// Upstream base URL
    #[arg(long, env = "THRONE_PROXY_BASE_URL")]
    pub base_url: Option<String>,

    /// Upstream API key
    #[arg(long, env = "THRONE_PROXY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Listen host
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Check upstream connectivity, print the model count and exit
    #[arg(long)]
    pub check: bool,
}

impl Args {
    /// Apply CLI flags on top of the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(provider) = &self.provider {
            config.upstream.provider = provider.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.upstream.base_url = Some(base_url.clone());
        }
        if let Some(api_key) = &self.api_key {
            config.upstream.api_key = Some(SecretString::new(api_key.clone()));
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}
