//! Axum-based HTTP server for the gateway.
//!
//! Exposes the Anthropic-compatible surface (`/v1/messages`,
//! `/v1/messages/count_tokens`, `/v1/models`) plus `/health` and `/metrics`,
//! and hands every request to the [`crate::gateway::Gateway`].
//!
//! # Components
//!
//! - `handlers`: Implementation of individual endpoints.
//! - `middleware`: Request ID propagation and the body size limit.
//! - `routes`: The router that ties everything together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use routes::{create_router, AppState};
