//! Connection setup and content-type/boundary validation

use std::pin::Pin;

use bytes::Bytes;
use futures::stream::Stream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use crate::error::ConnectionError;
use crate::target::ConnectionTarget;

const MULTIPART_MIXED_REPLACE: &str = "multipart/x-mixed-replace";
const BOUNDARY_PARAM: &str = "boundary=";

/// The underlying chunked byte source of an open stream.
pub type ByteSource = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// The part delimiter extracted from the `Content-Type` header.
///
/// Normalized to always carry the `--` prefix. Some cameras put the prefix
/// into the header value already (`boundary=--myboundary`) and then use it
/// as-is on the wire, so a supplied prefix is never doubled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryToken(String);

impl BoundaryToken {
    /// Extract and normalize the boundary from a content-type value.
    pub fn parse(content_type: &str) -> Result<Self, ConnectionError> {
        let start = content_type
            .find(BOUNDARY_PARAM)
            .ok_or_else(|| ConnectionError::MissingBoundary(content_type.to_string()))?;
        let raw = content_type[start + BOUNDARY_PARAM.len()..].trim();
        Ok(Self::normalize(raw))
    }

    fn normalize(raw: &str) -> Self {
        if raw.starts_with("--") {
            Self(raw.to_string())
        } else {
            Self(format!("--{}", raw))
        }
    }

    /// The line opening each part.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The line closing the whole stream.
    pub fn terminal(&self) -> String {
        format!("{}--", self.0)
    }
}

/// A validated, open `multipart/x-mixed-replace` response.
///
/// Wraps the response byte stream plus the normalized boundary token.
/// Finite and non-restartable; a new connection is required to consume
/// the stream again.
pub struct OpenStream {
    source: Option<ByteSource>,
    boundary: BoundaryToken,
}

impl std::fmt::Debug for OpenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenStream")
            .field("source", &self.source.as_ref().map(|_| "ByteSource"))
            .field("boundary", &self.boundary)
            .finish()
    }
}

impl OpenStream {
    pub fn new(source: ByteSource, boundary: BoundaryToken) -> Self {
        Self {
            source: Some(source),
            boundary,
        }
    }

    pub fn boundary(&self) -> &BoundaryToken {
        &self.boundary
    }

    /// Drop the underlying byte source, closing the socket.
    ///
    /// Idempotent, and safe to call whether or not reads ever happened.
    pub fn disconnect(&mut self) {
        if self.source.take().is_some() {
            debug!("stream source disconnected");
        }
    }

    pub(crate) fn source_mut(&mut self) -> Option<&mut ByteSource> {
        self.source.as_mut()
    }
}

/// Opens and validates `multipart/x-mixed-replace` connections.
///
/// The client is built without a request timeout: a camera's inter-frame
/// cadence is unbounded, and a merely slow stream must never be closed by
/// surprise. The trade-off is that a stalled read can only be ended by
/// cancellation.
#[derive(Debug, Clone)]
pub struct StreamConnection {
    client: Client,
}

impl StreamConnection {
    pub fn new() -> Result<Self, ConnectionError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    /// Open the target and validate the response as an MJPEG stream.
    ///
    /// Attaches Basic auth when the target carries credentials (an empty
    /// password is allowed and sent as `user:`).
    pub async fn connect(&self, target: &ConnectionTarget) -> Result<OpenStream, ConnectionError> {
        let mut request = self.client.get(target.url().clone());
        if let Some(creds) = target.credentials() {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = request.send().await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !content_type.starts_with(MULTIPART_MIXED_REPLACE) {
            return Err(ConnectionError::UnsupportedContentType(content_type));
        }

        let boundary = BoundaryToken::parse(&content_type)?;
        debug!(content_type = %content_type, boundary = %boundary.as_str(), "stream opened");

        let source = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();

        Ok(OpenStream::new(source, boundary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_is_prefixed() {
        let token =
            BoundaryToken::parse("multipart/x-mixed-replace; boundary=myboundary").unwrap();
        assert_eq!(token.as_str(), "--myboundary");
        assert_eq!(token.terminal(), "--myboundary--");
    }

    #[test]
    fn test_boundary_prefix_not_doubled() {
        let token =
            BoundaryToken::parse("multipart/x-mixed-replace; boundary=--myboundary").unwrap();
        assert_eq!(token.as_str(), "--myboundary");
    }

    #[test]
    fn test_missing_boundary_is_explicit() {
        let err = BoundaryToken::parse("multipart/x-mixed-replace").unwrap_err();
        assert!(matches!(err, ConnectionError::MissingBoundary(_)));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let source: ByteSource = Box::pin(futures::stream::empty());
        let mut open = OpenStream::new(source, BoundaryToken::normalize("b"));
        open.disconnect();
        open.disconnect();
        assert!(open.source_mut().is_none());
    }
}
