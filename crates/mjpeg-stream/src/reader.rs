//! Line- and header-oriented multipart frame parser
//!
//! Pulls boundary lines, part headers, and exact-length binary bodies out
//! of one open stream. Line reads and body reads drain the same internal
//! buffer, so the two can never desynchronize: a body read always starts at
//! the first byte after the preceding blank line's LF.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::connection::OpenStream;
use crate::error::ProtocolError;
use crate::events::Frame;

const CONTENT_LENGTH: &str = "content-length";

/// Lower-cased part headers; on duplicate names the last occurrence wins.
pub type HeaderMap = HashMap<String, String>;

/// A pull-based, single-consumer sequence of frames over one [`OpenStream`].
///
/// Finite and non-restartable: once the terminal boundary line
/// (`--<token>--`) is observed the reader is exhausted and attempts no
/// further reads. Each pull returns `Some(Ok(frame))`, `Some(Err(..))` on a
/// transport fault or cancellation, or `None` once exhausted.
pub struct MultipartFrameReader {
    open: OpenStream,
    buf: BytesMut,
    exhausted: bool,
    cancel: watch::Receiver<bool>,
    // Keeps the cancel channel alive for readers built without a worker.
    _standalone_cancel: Option<watch::Sender<bool>>,
}

impl MultipartFrameReader {
    /// A reader that can only be stopped by dropping it.
    pub fn new(open: OpenStream) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            open,
            buf: BytesMut::with_capacity(8192),
            exhausted: false,
            cancel: rx,
            _standalone_cancel: Some(tx),
        }
    }

    /// A reader whose in-progress reads abort with
    /// [`ProtocolError::Cancelled`] once the watched flag turns true.
    pub fn with_cancel(open: OpenStream, cancel: watch::Receiver<bool>) -> Self {
        Self {
            open,
            buf: BytesMut::with_capacity(8192),
            exhausted: false,
            cancel,
            _standalone_cancel: None,
        }
    }

    /// Whether another frame may still arrive.
    ///
    /// Reflects the exhausted flag only: it turns false exactly when the
    /// terminal boundary line has been observed, never merely because the
    /// socket currently has no buffered bytes.
    pub fn has_next(&self) -> bool {
        !self.exhausted
    }

    /// Pull one frame. Returns `None` once the stream's terminal boundary
    /// has been observed.
    pub async fn next_frame(&mut self) -> Option<Result<Frame, ProtocolError>> {
        if self.exhausted {
            return None;
        }
        match self.pull().await {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }

    /// Drop the underlying connection. Idempotent; further pulls fail.
    pub fn disconnect(&mut self) {
        self.open.disconnect();
    }

    async fn pull(&mut self) -> Result<Option<Frame>, ProtocolError> {
        self.read_until_boundary().await?;
        if self.exhausted {
            return Ok(None);
        }

        let headers = self.read_headers().await?;
        let length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.trim().parse::<usize>().ok());

        // A part without a usable Content-Length yields an empty frame
        // instead of aborting the sequence; the worker counts it as an
        // error frame and the next boundary scan resynchronizes.
        let Some(length) = length else {
            debug!(?headers, "part without usable content-length");
            return Ok(Some(Frame::empty()));
        };

        let body = self.read_exact(length).await?;
        trace!(len = length, "frame body read");
        Ok(Some(Frame::new(body, length)))
    }

    /// Read lines until one opens a part or closes the stream.
    async fn read_until_boundary(&mut self) -> Result<(), ProtocolError> {
        loop {
            if self.exhausted {
                return Ok(());
            }
            let line = self.read_line().await?;
            if line == self.open.boundary().as_str() {
                return Ok(());
            }
            if line == self.open.boundary().terminal() {
                debug!("terminal boundary observed, stream exhausted");
                self.exhausted = true;
                return Ok(());
            }
        }
    }

    /// Read part headers up to the blank separator line.
    async fn read_headers(&mut self) -> Result<HeaderMap, ProtocolError> {
        let mut headers = HeaderMap::new();
        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                return Ok(headers);
            }
            if let Some((name, value)) = line.split_once(": ") {
                headers.insert(name.to_ascii_lowercase(), value.to_string());
            } else {
                trace!(line = %line, "skipping malformed header line");
            }
        }
    }

    /// Return one LF-terminated line, CR stripped and trimmed, consuming
    /// exactly the line's bytes so the next read starts right after the LF.
    async fn read_line(&mut self) -> Result<String, ProtocolError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                let line = &line[..line.len() - 1];
                let line = match line.last() {
                    Some(&b'\r') => &line[..line.len() - 1],
                    _ => line,
                };
                return Ok(String::from_utf8_lossy(line).trim().to_string());
            }
            // Whole buffer is a legitimate partial line; wait for more.
            match self.next_chunk().await? {
                Some(chunk) => self.buf.extend_from_slice(&chunk),
                None => return Err(ProtocolError::unexpected_eof("inside a line")),
            }
        }
    }

    /// Accumulate exactly `length` body bytes, tolerating short chunks.
    async fn read_exact(&mut self, length: usize) -> Result<Bytes, ProtocolError> {
        while self.buf.len() < length {
            match self.next_chunk().await? {
                Some(chunk) => self.buf.extend_from_slice(&chunk),
                None => return Err(ProtocolError::unexpected_eof("inside a frame body")),
            }
        }
        Ok(self.buf.split_to(length).freeze())
    }

    /// Await the next transport chunk, racing the cancellation flag.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        let source = self
            .open
            .source_mut()
            .ok_or_else(ProtocolError::disconnected)?;
        let cancel = &mut self.cancel;
        tokio::select! {
            chunk = source.next() => match chunk {
                Some(Ok(bytes)) => Ok(Some(bytes)),
                Some(Err(e)) => Err(ProtocolError::Io(e)),
                None => Ok(None),
            },
            // A dropped sender means the owning worker is gone; treat it
            // the same as an explicit stop request.
            _ = cancel.wait_for(|&flagged| flagged) => Err(ProtocolError::Cancelled),
        }
    }
}
