//! Configuration and shared helpers.

/// Layered configuration (defaults, TOML, `.env`, environment).
pub mod config;
/// Subscriber setup for the binary.
pub mod logging;
/// Retry with exponential backoff for HTTP calls.
pub mod retry;
