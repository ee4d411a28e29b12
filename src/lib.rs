//! GreenLens API guard library.
//!
//! Request protection for the GreenLens REST API: per-client rate limiting,
//! markup sanitization, SQL-pattern rejection, upload validation, response
//! compression and security headers, as composable axum middleware.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GuardConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
