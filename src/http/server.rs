//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up the guard pipeline in order
//! - Bind server to listener with peer address info
//! - Drain on shutdown signal
//!
//! # Layer Order (outermost first)
//! ```text
//! set request id → propagate request id → trace → security headers
//!   → compression bypass → compression → timeout
//!   → [matched routes] input guard → rate limit → handler
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::header::{InvalidHeaderName, InvalidHeaderValue},
    http::HeaderName,
    middleware::{from_fn_with_state, map_response_with_state},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GuardConfig;
use crate::http::compression::{compression_bypass_middleware, compression_layer};
use crate::http::handlers::{self, AppState};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestSpan};
use crate::security::headers::{security_headers_middleware, SecurityHeaders};
use crate::security::injection::PatternError;
use crate::security::input::{input_guard_middleware, InputGuardState};
use crate::security::rate_limit::{rate_limit_middleware, RateLimitState};
use crate::security::upload::UploadPolicy;

/// Multipart framing allowance on top of the per-file limit.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

/// Errors building or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("invalid security header value: {0}")]
    HeaderValue(#[from] InvalidHeaderValue),
    #[error("invalid header name: {0}")]
    HeaderName(#[from] InvalidHeaderName),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server for the guarded API.
pub struct HttpServer {
    router: Router,
    config: GuardConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GuardConfig) -> Result<Self, ServerError> {
        let rate_limit = RateLimitState::new(config.rate_limit.clone());
        let router = build_router(&config, rate_limit)?;
        Ok(Self { router, config })
    }

    /// Create a server around an externally built limiter, e.g. one on a
    /// manual clock.
    pub fn with_rate_limit(config: GuardConfig, rate_limit: RateLimitState) -> Result<Self, ServerError> {
        let router = build_router(&config, rate_limit)?;
        Ok(Self { router, config })
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &GuardConfig, rate_limit: RateLimitState) -> Result<Router, ServerError> {
    let input_guard = InputGuardState::new(config.sanitizer.clone())?;
    let security_headers = Arc::new(SecurityHeaders::from_config(&config.security_headers)?);
    let state = AppState {
        uploads: Arc::new(UploadPolicy::from_config(&config.uploads)),
    };
    let upload_limit = usize::try_from(config.uploads.max_file_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(2)
        .saturating_add(UPLOAD_OVERHEAD_BYTES);

    // route_layer: last added runs first, and only on matched routes.
    let api = Router::new()
        .route("/api/echo", get(handlers::echo).post(handlers::echo))
        .route("/api/echo/{segment}", get(handlers::echo_segment))
        .route(
            "/api/uploads",
            post(handlers::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route_layer(from_fn_with_state(rate_limit, rate_limit_middleware))
        .route_layer(from_fn_with_state(input_guard, input_guard_middleware));

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

    if config.compression.enabled {
        let bypass = HeaderName::from_bytes(config.compression.bypass_header.as_bytes())?;
        router = router
            .layer(compression_layer(&config.compression))
            .layer(from_fn_with_state(bypass, compression_bypass_middleware));
    }

    Ok(router
        .layer(map_response_with_state(
            security_headers,
            security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer()))
}
