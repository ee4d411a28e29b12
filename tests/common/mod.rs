//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Request, Response};
use greenlens_guard::http::ServerError;
use greenlens_guard::{GuardConfig, HttpServer, Shutdown};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const BOUNDARY: &str = "greenlens-test-boundary";

/// Start a guard on an ephemeral local port.
pub async fn spawn_guard(
    config: GuardConfig,
) -> (SocketAddr, Shutdown, JoinHandle<Result<(), ServerError>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, rx).await });
    (addr, shutdown, handle)
}

/// Build a single-file multipart body. Returns (content type, body).
pub fn multipart_file(file_name: &str, mime_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {mime_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
