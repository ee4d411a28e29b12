//! Fixed-window rate limiting per client.
//!
//! Each client identifier owns a counter that starts at zero when its window
//! opens and is reset once `reset_at` has passed. Expired counters are swept
//! on every check, so there is no background task.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::http::response::rate_limited;
use crate::observability::metrics;
use crate::security::is_exempt;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Bucket used when no client identifier can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Counter for one client within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClientWindowCounter {
    count: u64,
    reset_at_ms: u64,
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u64,
        remaining: u64,
        reset_at_ms: u64,
    },
    Limited {
        limit: u64,
        reset_at_ms: u64,
        retry_after_secs: u64,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }

    /// Write the `X-RateLimit-*` headers describing this decision.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        let (limit, remaining, reset_at_ms) = match *self {
            RateLimitDecision::Allowed {
                limit,
                remaining,
                reset_at_ms,
            } => (limit, remaining, reset_at_ms),
            RateLimitDecision::Limited {
                limit,
                reset_at_ms,
                ..
            } => (limit, 0, reset_at_ms),
        };
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_at_ms / 1000));
    }
}

/// In-memory fixed-window limiter keyed by client identifier.
pub struct FixedWindowLimiter {
    counters: DashMap<String, ClientWindowCounter>,
    max_requests: u64,
    window_ms: u64,
    clock: Arc<dyn Clock>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u64, window_ms: u64) -> Self {
        Self::with_clock(max_requests, window_ms, Arc::new(SystemClock))
    }

    pub fn with_clock(max_requests: u64, window_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            max_requests,
            window_ms,
            clock,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window_ms)
    }

    /// Count one request for `client` and decide whether it may proceed.
    pub fn check(&self, client: &str) -> RateLimitDecision {
        let now = self.clock.now_ms();

        // Sweep before taking the entry lock; retain locks every shard.
        self.counters.retain(|_, c| c.reset_at_ms > now);

        let key = if client.is_empty() { UNKNOWN_CLIENT } else { client };
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert(ClientWindowCounter {
                count: 0,
                reset_at_ms: now.saturating_add(self.window_ms),
            });
        let counter = entry.value_mut();
        if counter.reset_at_ms <= now {
            counter.count = 0;
            counter.reset_at_ms = now.saturating_add(self.window_ms);
        }
        counter.count += 1;

        if counter.count > self.max_requests {
            let remaining_ms = counter.reset_at_ms.saturating_sub(now);
            RateLimitDecision::Limited {
                limit: self.max_requests,
                reset_at_ms: counter.reset_at_ms,
                retry_after_secs: remaining_ms.div_ceil(1000).max(1),
            }
        } else {
            RateLimitDecision::Allowed {
                limit: self.max_requests,
                remaining: self.max_requests - counter.count,
                reset_at_ms: counter.reset_at_ms,
            }
        }
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.counters.len()
    }
}

/// State for the rate limit middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<FixedWindowLimiter>,
    pub config: Arc<RateLimitConfig>,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: Arc::new(FixedWindowLimiter::from_config(&config)),
            config: Arc::new(config),
        }
    }

    pub fn with_limiter(config: RateLimitConfig, limiter: FixedWindowLimiter) -> Self {
        Self {
            limiter: Arc::new(limiter),
            config: Arc::new(config),
        }
    }
}

/// Resolve the identifier used to bucket a request.
pub fn client_key(request: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Middleware function for fixed-window rate limiting.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if !state.config.enabled || is_exempt(path, &state.config.exempt_paths) {
        return next.run(request).await;
    }

    let key = client_key(&request, state.config.trust_forwarded_for);
    let decision = state.limiter.check(&key);

    let mut response = match decision {
        RateLimitDecision::Allowed { .. } => next.run(request).await,
        RateLimitDecision::Limited {
            retry_after_secs, ..
        } => {
            tracing::warn!(client = %key, retry_after_secs, "Rate limit exceeded");
            metrics::record_rate_limited();
            let mut response = rate_limited(retry_after_secs);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
            response
        }
    };
    decision.apply_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u64, window_ms: u64) -> (FixedWindowLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        (
            FixedWindowLimiter::with_clock(max, window_ms, clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_admits_up_to_limit_then_rejects() {
        let (limiter, _) = limiter(5, 60_000);
        for n in 1..=5 {
            match limiter.check("A") {
                RateLimitDecision::Allowed { remaining, .. } => assert_eq!(remaining, 5 - n),
                other => panic!("request {n} should pass, got {other:?}"),
            }
        }
        match limiter.check("A") {
            RateLimitDecision::Limited {
                retry_after_secs, ..
            } => assert!(retry_after_secs <= 60 && retry_after_secs >= 1),
            other => panic!("sixth request should be limited, got {other:?}"),
        }
    }

    #[test]
    fn test_window_expiry_starts_fresh() {
        let (limiter, clock) = limiter(2, 1_000);
        assert!(limiter.check("A").is_allowed());
        assert!(limiter.check("A").is_allowed());
        assert!(!limiter.check("A").is_allowed());

        clock.advance(1_000);
        match limiter.check("A") {
            RateLimitDecision::Allowed { remaining, .. } => assert_eq!(remaining, 1),
            other => panic!("expected fresh window, got {other:?}"),
        }
    }

    #[test]
    fn test_clients_are_isolated() {
        let (limiter, _) = limiter(1, 60_000);
        assert!(limiter.check("A").is_allowed());
        assert!(!limiter.check("A").is_allowed());
        assert!(limiter.check("B").is_allowed());
    }

    #[test]
    fn test_expired_counters_are_swept() {
        let (limiter, clock) = limiter(10, 500);
        limiter.check("A");
        limiter.check("B");
        assert_eq!(limiter.tracked_clients(), 2);

        clock.advance(600);
        limiter.check("C");
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let (limiter, _) = limiter(1, u64::MAX);
        match limiter.check("A") {
            RateLimitDecision::Allowed { reset_at_ms, .. } => assert_eq!(reset_at_ms, u64::MAX),
            other => panic!("expected first request to pass, got {other:?}"),
        }
        assert!(!limiter.check("A").is_allowed());
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let (limiter, clock) = limiter(1, 10_000);
        limiter.check("A");
        clock.advance(8_500);
        match limiter.check("A") {
            RateLimitDecision::Limited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 2),
            other => panic!("expected limit, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_identifier_uses_sentinel_bucket() {
        let (limiter, _) = limiter(1, 60_000);
        assert!(limiter.check("").is_allowed());
        assert!(!limiter.check(UNKNOWN_CLIENT).is_allowed());
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let (limiter, _) = limiter(50, 60_000);
        let limiter = Arc::new(limiter);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..25).filter(|_| limiter.check("A").is_allowed()).count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[test]
    fn test_client_key_fallbacks() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&req, true), "203.0.113.7");
        assert_eq!(client_key(&req, false), UNKNOWN_CLIENT);

        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_key(&req, false), "192.0.2.1");
    }

    #[test]
    fn test_headers_report_reset_in_seconds() {
        let decision = RateLimitDecision::Allowed {
            limit: 5,
            remaining: 4,
            reset_at_ms: 1_700_000_060_000,
        };
        let mut headers = HeaderMap::new();
        decision.apply_headers(&mut headers);
        assert_eq!(headers[X_RATELIMIT_LIMIT], "5");
        assert_eq!(headers[X_RATELIMIT_REMAINING], "4");
        assert_eq!(headers[X_RATELIMIT_RESET], "1700000060");
    }
}
