//! MJPEG Stream Ingestion Library
//!
//! Ingests a `multipart/x-mixed-replace` HTTP stream (the "MJPEG"
//! camera-streaming convention) and yields a continuous sequence of
//! still-image payloads plus running transfer statistics, cancellable at
//! any time.
//!
//! # Example
//!
//! ```rust,no_run
//! use mjpeg_stream::{ConnectionTarget, StreamEvent, StreamWorker};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let target = ConnectionTarget::parse("http://camera.local/axis-cgi/mjpg/video.cgi")?;
//!
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     let worker = StreamWorker::spawn(target, tx);
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             StreamEvent::Frame(frame) => {
//!                 // frame.bytes() is one complete JPEG payload
//!             }
//!             StreamEvent::Stats(stats) => {
//!                 println!("{} frames, {}", stats.frame_count, stats.bandwidth);
//!             }
//!             StreamEvent::Error { message } => {
//!                 eprintln!("stream failed: {message}");
//!             }
//!         }
//!     }
//!
//!     worker.join().await;
//!     Ok(())
//! }
//! ```
//!
//! # Protocol
//!
//! The consumed wire format is an HTTP response with
//! `Content-Type: multipart/x-mixed-replace; boundary=<token>` whose body
//! repeats, until EOF or the terminal line `--<token>--`:
//!
//! ```text
//! --<token>\r\n
//! <header-name>: <header-value>\r\n   (zero or more)
//! \r\n
//! <exactly Content-Length bytes of binary payload>
//! ```
//!
//! Chunked transfer-encoding and multipart variants other than
//! boundary + `Content-Length`-delimited parts are out of scope, as is
//! decoding the JPEG payloads.
//!
//! # Testing
//!
//! The [`testing`] module provides an in-process server emitting canned
//! multipart bodies:
//!
//! ```rust,ignore
//! use mjpeg_stream::testing::{content_type_for, multipart_body, stream_router, MjpegTestServer};
//!
//! let body = multipart_body("myboundary", &[b"AAAA", b"BBB"]);
//! let server = MjpegTestServer::start(stream_router(
//!     content_type_for("myboundary"),
//!     body,
//! )).await?;
//! let target = ConnectionTarget::parse(&server.url("/stream"))?;
//! ```

mod connection;
mod error;
mod events;
mod reader;
mod stats;
mod target;
pub mod testing;
mod worker;

pub use connection::{BoundaryToken, ByteSource, OpenStream, StreamConnection};
pub use error::{ConnectionError, ProtocolError};
pub use events::{Frame, StreamEvent};
pub use reader::{HeaderMap, MultipartFrameReader};
pub use stats::{
    bandwidth_kbps, format_human_bytes, format_uptime, StatsSnapshot, StatsTracker,
};
pub use target::{ConnectionTarget, Credentials};
pub use worker::{EventSink, StreamSession, StreamWorker};
