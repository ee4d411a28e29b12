//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::security::sanitizer::DEFAULT_ALLOWED_TAGS;

/// Root configuration for the API guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Markup sanitization and SQL-pattern rejection.
    pub sanitizer: SanitizerConfig,

    /// Response compression.
    pub compression: CompressionConfig,

    /// Security response headers.
    pub security_headers: SecurityHeadersConfig,

    /// File upload validation.
    pub uploads: UploadConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per client within one window.
    pub max_requests: u64,

    /// Window duration in milliseconds.
    pub window_ms: u64,

    /// Use the first `X-Forwarded-For` hop as the client identifier.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,

    /// Path prefixes that bypass the limiter.
    pub exempt_paths: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_ms: 15 * 60 * 1000,
            trust_forwarded_for: false,
            exempt_paths: vec!["/health".to_string()],
        }
    }
}

/// Input sanitization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Enable sanitization and SQL-pattern rejection.
    pub enabled: bool,

    /// Markup tags allowed to survive sanitization (attributes are always dropped).
    pub allowed_tags: Vec<String>,

    /// Ordered deny-list of regular expressions; any match rejects the request.
    pub rejection_patterns: Vec<String>,

    /// Maximum buffered body size in bytes.
    pub max_body_bytes: usize,

    /// Path prefixes that bypass the input guard.
    pub exempt_paths: Vec<String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_tags: DEFAULT_ALLOWED_TAGS.iter().map(|t| t.to_string()).collect(),
            rejection_patterns: vec![
                r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|EXEC|UNION|SCRIPT)\b"
                    .to_string(),
                r"(;|--|/\*|\*/)".to_string(),
                r"(?i)(\bOR\b.*=.*|1=1|'=')".to_string(),
            ],
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            exempt_paths: Vec::new(),
        }
    }
}

/// Response compression configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Enable response compression.
    pub enabled: bool,

    /// Responses larger than this many bytes are compressed.
    pub threshold_bytes: u64,

    /// Compression level (0 = none, 9 = best).
    pub level: u32,

    /// zlib memory level. Fixed at 8; other values fail validation.
    pub mem_level: u32,

    /// zlib window size as a base-two logarithm. Fixed at 15.
    pub window_bits: u32,

    /// Output chunk size in bytes. Fixed at 16384.
    pub chunk_size: usize,

    /// Content-type prefixes eligible for compression.
    pub content_types: Vec<String>,

    /// Request header that disables compression for that request.
    pub bypass_header: String,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: 1024,
            level: 6,
            mem_level: 8,
            window_bits: 15,
            chunk_size: 16 * 1024,
            content_types: [
                "text/",
                "application/json",
                "application/javascript",
                "application/xml",
                "image/svg",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
            bypass_header: "x-no-compression".to_string(),
        }
    }
}

/// Security response header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityHeadersConfig {
    /// Value of the `Referrer-Policy` header.
    pub referrer_policy: String,

    /// Value of the `Permissions-Policy` header.
    pub permissions_policy: String,

    /// `Strict-Transport-Security` max-age; 0 disables the header.
    pub hsts_max_age_secs: u64,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            permissions_policy: "camera=(), microphone=(), geolocation=()".to_string(),
            hsts_max_age_secs: 0,
        }
    }
}

/// File upload validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum size of a single file in bytes.
    pub max_file_bytes: u64,

    /// MIME types accepted for uploads.
    pub allowed_mime_types: Vec<String>,

    /// File extensions rejected regardless of declared MIME type.
    pub dangerous_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024, // 10MB
            allowed_mime_types: [
                "image/jpeg",
                "image/png",
                "image/webp",
                "image/gif",
                "application/pdf",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
            dangerous_extensions: [
                "exe", "bat", "cmd", "com", "scr", "pif", "vbs", "js", "jar", "sh", "ps1", "msi",
                "dll", "php",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
