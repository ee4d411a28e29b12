//! Diagnostic route handlers.
//!
//! The business API lives behind the guard; these routes exist so the
//! pipeline can be exercised end to end and monitored.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::Field, Multipart, Path, RawQuery, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::http::response::bad_request;
use crate::observability::metrics;
use crate::security::upload::{UploadError, UploadPolicy};

/// State shared by route handlers.
#[derive(Clone)]
pub struct AppState {
    pub uploads: Arc<UploadPolicy>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Returns the query and body as the handler sees them, after the guard.
pub async fn echo(RawQuery(query): RawQuery, body: Bytes) -> Json<Value> {
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    Json(json!({ "query": query, "body": body }))
}

pub async fn echo_segment(Path(segment): Path<String>) -> Json<Value> {
    Json(json!({ "segment": segment }))
}

/// Validates every file part of a multipart upload.
///
/// File bodies are streamed and counted, never stored; the request is
/// refused as soon as one file breaks the policy.
pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return upload_rejected(UploadError::Malformed(e.body_text())),
        };
        // Plain form fields are ignored.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let size = match measure(field, &state.uploads).await {
            Ok(size) => size,
            Err(e) => return upload_rejected(e),
        };
        if let Err(e) = state.uploads.check_name_and_type(&file_name, &mime_type) {
            return upload_rejected(e);
        }

        metrics::record_upload_accepted();
        files.push(json!({ "fileName": file_name, "mimeType": mime_type, "size": size }));
    }

    if files.is_empty() {
        return bad_request("No file uploaded");
    }
    Json(json!({ "success": true, "files": files })).into_response()
}

async fn measure(mut field: Field<'_>, policy: &UploadPolicy) -> Result<u64, UploadError> {
    let mut size = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| UploadError::Malformed(e.body_text()))?
    {
        size += chunk.len() as u64;
        policy.check_size(size)?;
    }
    Ok(size)
}

fn upload_rejected(err: UploadError) -> Response {
    tracing::warn!(reason = err.reason(), error = %err, "Upload rejected");
    metrics::record_upload_rejected(err.reason());
    bad_request(&err.to_string())
}
