//! Response compression policy.
//!
//! Compression is delegated to `tower-http`; this module decides *when*:
//! the response must carry a text-like content type and exceed the size
//! threshold, and the request must not carry the bypass header. Streaming
//! responses of unknown length are always eligible.
//!
//! The encoders only take a quality setting, so `level` is the one tunable;
//! validation pins the remaining zlib knobs to their defaults.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{
        header::{ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderName, Request, Response,
    },
    middleware::Next,
};
use tower_http::compression::{
    predicate::{And, Predicate},
    CompressionLayer, CompressionLevel,
};

use crate::config::CompressionConfig;

/// Allows compression only for bodies strictly larger than a byte count.
#[derive(Debug, Clone, Copy)]
pub struct SizeExceeds(pub u64);

impl Predicate for SizeExceeds {
    fn should_compress<B>(&self, response: &Response<B>) -> bool
    where
        B: HttpBody,
    {
        let size = response.body().size_hint().exact().or_else(|| {
            response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        });
        size.is_none_or(|size| size > self.0)
    }
}

/// Allows compression only for configured content-type prefixes.
#[derive(Debug, Clone)]
pub struct CompressibleContentType {
    prefixes: Arc<[String]>,
}

impl CompressibleContentType {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn matches(&self, content_type: &str) -> bool {
        let content_type = content_type.trim().to_ascii_lowercase();
        self.prefixes.iter().any(|p| content_type.starts_with(p.as_str()))
    }
}

impl Predicate for CompressibleContentType {
    fn should_compress<B>(&self, response: &Response<B>) -> bool
    where
        B: HttpBody,
    {
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| self.matches(ct))
    }
}

pub type GuardCompressionLayer = CompressionLayer<And<SizeExceeds, CompressibleContentType>>;

/// Build the compression layer from configuration.
pub fn compression_layer(config: &CompressionConfig) -> GuardCompressionLayer {
    tracing::debug!(
        level = config.level,
        threshold_bytes = config.threshold_bytes,
        "Compression configured"
    );
    CompressionLayer::new()
        .quality(CompressionLevel::Precise(config.level as i32))
        .compress_when(
            SizeExceeds(config.threshold_bytes)
                .and(CompressibleContentType::new(&config.content_types)),
        )
}

/// Strips `Accept-Encoding` from requests carrying the bypass header.
/// Must wrap the compression layer.
pub async fn compression_bypass_middleware(
    State(bypass_header): State<HeaderName>,
    mut request: Request<Body>,
    next: Next,
) -> axum::response::Response {
    if request.headers().contains_key(&bypass_header) {
        request.headers_mut().remove(ACCEPT_ENCODING);
    }
    next.run(request).await
}
