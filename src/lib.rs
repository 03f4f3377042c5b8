// throne-proxy - Anthropic Messages API gateway for OpenAI-compatible backends
// Author: kelexine (https://github.com/kelexine)

pub mod capability;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod models;
pub mod routing;
pub mod server;
pub mod tools;
pub mod transform;
pub mod translation;
pub mod upstream;
pub mod utils;
