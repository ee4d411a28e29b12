//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All middleware produces:
//!     → logging.rs (structured log events)
//!     → metrics.rs (rejection counters)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every rejection, never the offending payload
//! - Request ID flows through the trace span of each request
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
