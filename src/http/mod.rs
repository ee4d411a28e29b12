//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layer order)
//!     → request.rs (request ID, trace span)
//!     → security middleware (see crate::security)
//!     → handlers.rs (diagnostic routes, uploads)
//!     → compression.rs (compress eligible responses)
//!     → response.rs (uniform rejection bodies)
//!     → Send to client
//! ```

pub mod compression;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{build_router, HttpServer, ServerError};
