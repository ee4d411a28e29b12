//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → input.rs (sanitizer.rs strips markup, injection.rs rejects SQL-like input)
//!     → rate_limit.rs (per-client fixed window)
//!     → handler (upload.rs validates multipart files)
//! Outgoing response:
//!     → headers.rs (security headers on every response)
//! ```
//!
//! # Design Decisions
//! - Each stage is independent and owns its own state
//! - Every check ends in allow or a definitive 4xx; nothing here is fatal
//! - Rejection bodies never reveal which field or rule matched

pub mod headers;
pub mod injection;
pub mod input;
pub mod rate_limit;
pub mod sanitizer;
pub mod upload;

/// True if `path` equals one of `prefixes` or lies beneath it.
///
/// Matching stops at segment boundaries: `/health` covers `/health` and
/// `/health/live` but not `/healthz`.
pub fn is_exempt(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}
