//! Test utilities for mjpeg-stream
//!
//! Provides an in-process HTTP server emitting canned
//! `multipart/x-mixed-replace` bodies, for integration tests that exercise
//! the real connect path.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use tokio::net::TcpListener;

/// A test server that shuts down when dropped.
pub struct MjpegTestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MjpegTestServer {
    /// Serve an axum router on an ephemeral local port.
    pub async fn start(router: Router) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give the server a moment to start
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Full URL for a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Shut the server down gracefully.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MjpegTestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// The content-type header value for a given boundary token (unprefixed).
pub fn content_type_for(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={}", boundary)
}

/// Assemble a complete multipart body: one `Content-Length`-delimited part
/// per payload, closed by the terminal boundary line.
pub fn multipart_body(boundary: &str, payloads: &[&[u8]]) -> Vec<u8> {
    let mut body = Vec::new();
    for payload in payloads {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Length: {}\r\n", payload.len()).as_bytes());
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(payload);
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

/// A router serving `body` at `/stream` with the given content type.
pub fn stream_router(content_type: String, body: Vec<u8>) -> Router {
    Router::new().route(
        "/stream",
        get(move || {
            let content_type = content_type.clone();
            let body = body.clone();
            async move { fixed_response(&content_type, body) }
        }),
    )
}

/// A router whose `/stream` response sends `head` and then stalls forever,
/// for exercising cancellation of an in-progress read.
pub fn stalling_stream_router(content_type: String, head: Vec<u8>) -> Router {
    Router::new().route(
        "/stream",
        get(move || {
            let content_type = content_type.clone();
            let head = head.clone();
            async move {
                let stream = async_stream::stream! {
                    yield Ok::<_, std::io::Error>(Bytes::from(head));
                    futures::future::pending::<()>().await;
                };
                Response::builder()
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from_stream(stream))
                    .expect("valid test response")
            }
        }),
    )
}

fn fixed_response(content_type: &str, body: Vec<u8>) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .expect("valid test response")
}
