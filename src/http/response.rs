//! Rejection responses produced by the guard.
//!
//! Bodies are JSON so API clients can handle them uniformly; none of them
//! reveals which field or rule caused the rejection beyond what the client
//! needs to fix the request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// 429 with the number of seconds until the client's window resets.
pub fn rate_limited(retry_after_secs: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": "Too many requests", "retryAfter": retry_after_secs })),
    )
        .into_response()
}

/// 400 for input matching a rejection pattern.
pub fn invalid_input() -> Response {
    bad_request("Invalid input detected")
}

/// 400 with a client-facing reason.
pub fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": message })),
    )
        .into_response()
}

/// 413 when a buffered body exceeds the configured limit.
pub fn payload_too_large() -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(json!({ "success": false, "message": "Request body too large" })),
    )
        .into_response()
}
