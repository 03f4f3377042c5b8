//! Utility functions and helpers for the gateway.
//!
//! This module provides cross-cutting concerns like structured logging,
//! credential sanitization, and the retry/budget controller that wraps
//! every outbound call.
//!
//! # Submodules
//!
//! - `logging`: Tracing initialization and log redaction.
//! - `retry`: Timeout, exponential backoff and an overall deadline per call.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod retry;
