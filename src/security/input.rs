//! Input guard middleware: sanitize, then reject suspicious input.
//!
//! # Data Flow
//! ```text
//! route params ─────────────────────────────┐
//! query string → decode → sanitize ─────────┤→ rejection patterns → 400
//! JSON / form body → buffer → sanitize ─────┘        │
//!                                                    ▼
//!                        rewritten request (sanitized query/body) → handler
//! ```
//!
//! Multipart bodies are never buffered here; uploads are validated by the
//! upload handler while streaming. Route parameters are only visible when the
//! guard is installed with `Router::route_layer`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, RawPathParams, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING},
        uri::PathAndQuery,
        HeaderValue, Request, Uri,
    },
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use url::form_urlencoded;

use crate::config::SanitizerConfig;
use crate::http::response::{invalid_input, payload_too_large};
use crate::observability::metrics;
use crate::security::injection::{PatternError, RejectionPatterns};
use crate::security::is_exempt;
use crate::security::sanitizer::SanitizationPolicy;

/// Where a suspicious value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Body,
    Query,
    Params,
}

impl InputSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputSource::Body => "body",
            InputSource::Query => "query",
            InputSource::Params => "params",
        }
    }
}

/// Input matched a rejection pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("suspicious input in {}", .0.as_str())]
pub struct SuspiciousInput(pub InputSource);

/// Sanitizer and rejector bundled for one request pipeline.
#[derive(Debug, Clone)]
pub struct InputGuard {
    policy: SanitizationPolicy,
    patterns: RejectionPatterns,
}

impl InputGuard {
    pub fn new(policy: SanitizationPolicy, patterns: RejectionPatterns) -> Self {
        Self { policy, patterns }
    }

    pub fn from_config(config: &SanitizerConfig) -> Result<Self, PatternError> {
        Ok(Self::new(
            SanitizationPolicy::from_config(config),
            RejectionPatterns::from_config(config)?,
        ))
    }

    /// Sanitize a decoded JSON document and check every leaf.
    pub fn inspect_json(&self, value: Value) -> Result<Value, SuspiciousInput> {
        let value = self.policy.sanitize_value(value);
        if self.patterns.matches_value(&value) {
            return Err(SuspiciousInput(InputSource::Body));
        }
        Ok(value)
    }

    /// Sanitize and check urlencoded pairs, keys as well as values.
    ///
    /// Returns the re-encoded string only if sanitization changed a value, so
    /// untouched input keeps its original encoding.
    pub fn inspect_urlencoded(
        &self,
        raw: &str,
        source: InputSource,
    ) -> Result<Option<String>, SuspiciousInput> {
        let mut changed = false;
        let mut pairs = Vec::new();
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            let clean_key = self.policy.sanitize_str(&key);
            let clean = self.policy.sanitize_str(&value);
            if self.patterns.matches_str(&clean_key) || self.patterns.matches_str(&clean) {
                return Err(SuspiciousInput(source));
            }
            changed |= clean_key != key || clean != value;
            pairs.push((clean_key, clean));
        }

        if !changed {
            return Ok(None);
        }
        Ok(Some(
            form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&pairs)
                .finish(),
        ))
    }

    /// Check matched route parameters.
    pub fn inspect_params<'a, I>(&self, params: I) -> Result<(), SuspiciousInput>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if params.into_iter().any(|v| self.patterns.matches_str(v)) {
            return Err(SuspiciousInput(InputSource::Params));
        }
        Ok(())
    }
}

/// State for the input guard middleware.
#[derive(Clone)]
pub struct InputGuardState {
    pub guard: Arc<InputGuard>,
    pub config: Arc<SanitizerConfig>,
}

impl InputGuardState {
    pub fn new(config: SanitizerConfig) -> Result<Self, PatternError> {
        Ok(Self {
            guard: Arc::new(InputGuard::from_config(&config)?),
            config: Arc::new(config),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Passthrough,
}

impl BodyKind {
    fn of(content_type: Option<&HeaderValue>) -> Self {
        let essence = content_type
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if essence == "application/json" || essence.ends_with("+json") {
            BodyKind::Json
        } else if essence == "application/x-www-form-urlencoded" {
            BodyKind::Form
        } else {
            BodyKind::Passthrough
        }
    }
}

fn reject(path: &str, err: SuspiciousInput) -> Response {
    tracing::warn!(path = %path, source = err.0.as_str(), "Suspicious input rejected");
    metrics::record_rejected_input(err.0.as_str());
    invalid_input()
}

/// Middleware function for input sanitization and rejection.
pub async fn input_guard_middleware(
    State(state): State<InputGuardState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !state.config.enabled || is_exempt(&path, &state.config.exempt_paths) {
        return next.run(request).await;
    }

    let guard = &state.guard;
    let (mut parts, body) = request.into_parts();

    if let Ok(params) = RawPathParams::from_request_parts(&mut parts, &()).await {
        if let Err(e) = guard.inspect_params(params.iter().map(|(_, v)| v)) {
            return reject(&path, e);
        }
    }

    if let Some(query) = parts.uri.query() {
        match guard.inspect_urlencoded(query, InputSource::Query) {
            Err(e) => return reject(&path, e),
            Ok(Some(clean)) => match rewrite_query(&parts.uri, &clean) {
                Some(uri) => parts.uri = uri,
                None => return invalid_input(),
            },
            Ok(None) => {}
        }
    }

    let body = match BodyKind::of(parts.headers.get(CONTENT_TYPE)) {
        BodyKind::Passthrough => body,
        kind => {
            let bytes = match axum::body::to_bytes(body, state.config.max_body_bytes).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!(path = %path, error = %e, "Failed to buffer request body");
                    return payload_too_large();
                }
            };

            let rewritten = match kind {
                BodyKind::Json => match serde_json::from_slice::<Value>(&bytes) {
                    Ok(value) => match guard.inspect_json(value) {
                        Ok(clean) => Some(clean.to_string()),
                        Err(e) => return reject(&path, e),
                    },
                    // Left for the handler's extractor to report.
                    Err(_) => None,
                },
                _ => {
                    let raw = String::from_utf8_lossy(&bytes);
                    match guard.inspect_urlencoded(&raw, InputSource::Body) {
                        Ok(clean) => clean,
                        Err(e) => return reject(&path, e),
                    }
                }
            };

            match rewritten {
                Some(clean) => {
                    parts.headers.remove(TRANSFER_ENCODING);
                    parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(clean.len()));
                    Body::from(clean)
                }
                None => Body::from(bytes),
            }
        }
    };

    next.run(Request::from_parts(parts, body)).await
}

fn rewrite_query(uri: &Uri, query: &str) -> Option<Uri> {
    let mut uri_parts = uri.clone().into_parts();
    let path_and_query = PathAndQuery::try_from(format!("{}?{}", uri.path(), query)).ok()?;
    uri_parts.path_and_query = Some(path_and_query);
    Uri::from_parts(uri_parts).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn guard() -> InputGuard {
        InputGuard::from_config(&SanitizerConfig::default()).unwrap()
    }

    #[test]
    fn test_json_is_sanitized_in_place() {
        let out = guard()
            .inspect_json(json!({ "name": "<b>Aloe</b>", "notes": ["<p class=x>sunny</p>"] }))
            .unwrap();
        assert_eq!(out, json!({ "name": "Aloe", "notes": ["<p>sunny</p>"] }));
    }

    #[test]
    fn test_json_with_sql_anywhere_is_rejected() {
        let err = guard()
            .inspect_json(json!({ "a": { "b": [1, "SELECT * FROM users"] } }))
            .unwrap_err();
        assert_eq!(err, SuspiciousInput(InputSource::Body));
    }

    #[test]
    fn test_benign_json_passes() {
        let input = json!({ "company": "Green organization", "qty": 4 });
        assert_eq!(guard().inspect_json(input.clone()).unwrap(), input);
    }

    #[test]
    fn test_urlencoded_unchanged_keeps_encoding() {
        assert_eq!(
            guard().inspect_urlencoded("q=snake%20plant&page=2", InputSource::Query),
            Ok(None)
        );
    }

    #[test]
    fn test_urlencoded_sanitized_and_reencoded() {
        let out = guard()
            .inspect_urlencoded("q=%3Cb%3Efern%3C%2Fb%3E&page=2", InputSource::Query)
            .unwrap();
        assert_eq!(out.as_deref(), Some("q=fern&page=2"));
    }

    #[test]
    fn test_urlencoded_rejection_reports_source() {
        let err = guard()
            .inspect_urlencoded("id=1%20OR%201%3D1", InputSource::Query)
            .unwrap_err();
        assert_eq!(err.0, InputSource::Query);
    }

    #[test]
    fn test_urlencoded_keys_are_checked_and_sanitized() {
        assert_eq!(
            guard().inspect_urlencoded("SELECT=1", InputSource::Query),
            Err(SuspiciousInput(InputSource::Query))
        );
        let out = guard()
            .inspect_urlencoded("%3Cscript%3Ex%3C%2Fscript%3Eq=1&page=2", InputSource::Query)
            .unwrap();
        assert_eq!(out.as_deref(), Some("q=1&page=2"));
    }

    #[test]
    fn test_params() {
        assert!(guard().inspect_params(["42", "monstera"]).is_ok());
        assert_eq!(
            guard().inspect_params(["1; DROP TABLE plants"]),
            Err(SuspiciousInput(InputSource::Params))
        );
    }

    #[test]
    fn test_body_kind_detection() {
        let json = HeaderValue::from_static("application/json; charset=utf-8");
        let vnd = HeaderValue::from_static("application/vnd.api+json");
        let form = HeaderValue::from_static("application/x-www-form-urlencoded");
        let multipart = HeaderValue::from_static("multipart/form-data; boundary=x");
        assert_eq!(BodyKind::of(Some(&json)), BodyKind::Json);
        assert_eq!(BodyKind::of(Some(&vnd)), BodyKind::Json);
        assert_eq!(BodyKind::of(Some(&form)), BodyKind::Form);
        assert_eq!(BodyKind::of(Some(&multipart)), BodyKind::Passthrough);
        assert_eq!(BodyKind::of(None), BodyKind::Passthrough);
    }

    #[test]
    fn test_rewrite_query_keeps_path() {
        let uri: Uri = "/api/echo?q=%3Cb%3Ex".parse().unwrap();
        let out = rewrite_query(&uri, "q=x").unwrap();
        assert_eq!(out.path(), "/api/echo");
        assert_eq!(out.query(), Some("q=x"));
    }
}
