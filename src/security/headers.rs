//! Security response headers.
//!
//! # Responsibilities
//! - Disable content-type sniffing
//! - Deny framing
//! - Enable the legacy XSS filter
//! - Apply referrer and permissions policies
//! - Optionally advertise HSTS
//!
//! Headers are written on every response, overriding whatever the handler
//! set, including responses produced by other guard stages (429, 400, 413).

use std::sync::Arc;

use axum::{
    extract::State,
    http::{
        header::{
            InvalidHeaderValue, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY,
            X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
        },
        HeaderMap, HeaderName, HeaderValue,
    },
    response::Response,
};

use crate::config::SecurityHeadersConfig;

pub const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

/// Precomputed header set applied to each response.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: HeaderMap,
}

impl SecurityHeaders {
    pub fn from_config(config: &SecurityHeadersConfig) -> Result<Self, InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
        headers.insert(
            REFERRER_POLICY,
            HeaderValue::from_str(&config.referrer_policy)?,
        );
        headers.insert(
            PERMISSIONS_POLICY,
            HeaderValue::from_str(&config.permissions_policy)?,
        );
        if config.hsts_max_age_secs > 0 {
            headers.insert(
                STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_str(&format!(
                    "max-age={}; includeSubDomains",
                    config.hsts_max_age_secs
                ))?,
            );
        }
        Ok(Self { headers })
    }

    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}

/// Response mapper installed with `axum::middleware::map_response_with_state`.
pub async fn security_headers_middleware(
    State(headers): State<Arc<SecurityHeaders>>,
    mut response: Response,
) -> Response {
    headers.apply(response.headers_mut());
    response
}
