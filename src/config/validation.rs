//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (window within 1ms-24h, compression level 0-9)
//! - Reject encoder knobs the compression backend cannot honour
//! - Check that rejection patterns compile
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use regex::Regex;

use crate::config::schema::{CompressionConfig, GuardConfig};

/// Longest accepted rate limit window (24 hours).
pub const MAX_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {:?}", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    let rl = &config.rate_limit;
    if rl.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be > 0"));
    }
    if rl.window_ms == 0 || rl.window_ms > MAX_WINDOW_MS {
        errors.push(ValidationError::new(
            "rate_limit.window_ms",
            format!("must be within 1-{MAX_WINDOW_MS}"),
        ));
    }

    let san = &config.sanitizer;
    for (i, pattern) in san.rejection_patterns.iter().enumerate() {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ValidationError::new(
                &format!("sanitizer.rejection_patterns[{}]", i),
                e.to_string(),
            ));
        }
    }
    for tag in &san.allowed_tags {
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            errors.push(ValidationError::new(
                "sanitizer.allowed_tags",
                format!("invalid tag name {:?}", tag),
            ));
        }
    }
    if san.max_body_bytes == 0 {
        errors.push(ValidationError::new("sanitizer.max_body_bytes", "must be > 0"));
    }

    let comp = &config.compression;
    if comp.level > 9 {
        errors.push(ValidationError::new("compression.level", "must be within 0-9"));
    }
    // The encoders run with fixed zlib parameters; only `level` is tunable.
    let fixed = CompressionConfig::default();
    for (field, value, default) in [
        ("compression.mem_level", comp.mem_level as usize, fixed.mem_level as usize),
        ("compression.window_bits", comp.window_bits as usize, fixed.window_bits as usize),
        ("compression.chunk_size", comp.chunk_size, fixed.chunk_size),
    ] {
        if value != default {
            errors.push(ValidationError::new(
                field,
                format!("not supported by the encoder, must be left at {default}"),
            ));
        }
    }
    if comp.bypass_header.parse::<axum::http::HeaderName>().is_err() {
        errors.push(ValidationError::new(
            "compression.bypass_header",
            format!("invalid header name {:?}", comp.bypass_header),
        ));
    }

    let headers = &config.security_headers;
    for (field, value) in [
        ("security_headers.referrer_policy", &headers.referrer_policy),
        ("security_headers.permissions_policy", &headers.permissions_policy),
    ] {
        if axum::http::HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(field, "not a valid header value"));
        }
    }

    if config.uploads.max_file_bytes == 0 {
        errors.push(ValidationError::new("uploads.max_file_bytes", "must be > 0"));
    }
    if config.uploads.allowed_mime_types.is_empty() {
        errors.push(ValidationError::new(
            "uploads.allowed_mime_types",
            "at least one MIME type is required",
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GuardConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = GuardConfig::default();
        config.rate_limit.max_requests = 0;
        config.rate_limit.window_ms = 0;
        config.compression.mem_level = 12;
        config.sanitizer.rejection_patterns.push("(unclosed".to_string());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(errors.len(), 4);
        assert!(fields.contains(&"rate_limit.max_requests"));
        assert!(fields.contains(&"rate_limit.window_ms"));
        assert!(fields.contains(&"compression.mem_level"));
        assert!(fields.contains(&"sanitizer.rejection_patterns[3]"));
    }

    #[test]
    fn test_window_upper_bound() {
        let mut config = GuardConfig::default();
        config.rate_limit.window_ms = MAX_WINDOW_MS;
        assert!(validate_config(&config).is_ok());

        config.rate_limit.window_ms = u64::MAX;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "rate_limit.window_ms");
    }

    #[test]
    fn test_fixed_encoder_knobs_are_rejected_when_changed() {
        let mut config = GuardConfig::default();
        config.compression.level = 9;
        assert!(validate_config(&config).is_ok());

        config.compression.window_bits = 12;
        config.compression.chunk_size = 4096;
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["compression.window_bits", "compression.chunk_size"]);
        assert!(errors[0].message.contains("not supported"));
    }

    #[test]
    fn test_rejects_bad_tag_name() {
        let mut config = GuardConfig::default();
        config.sanitizer.allowed_tags.push("<a>".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "sanitizer.allowed_tags");
    }
}
