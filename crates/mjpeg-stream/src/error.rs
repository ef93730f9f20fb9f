//! Error types for stream ingestion

use thiserror::Error;

/// Errors that prevent a stream session from reaching the streaming phase.
///
/// All variants are fatal to the session: they are reported once via
/// [`StreamEvent::Error`](crate::StreamEvent::Error) and the worker goes
/// straight to termination.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The target URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The URL carried userinfo that is not of the form `user:pass`
    #[error("Invalid credentials in URL: {0}")]
    InvalidCredentials(String),

    /// HTTP request failed (unreachable host, refused connection, ...)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response is not a `multipart/x-mixed-replace` stream
    #[error("Unsupported Content-Type: {0}")]
    UnsupportedContentType(String),

    /// The content type carries no `boundary=` parameter
    #[error("Content-Type has no boundary parameter: {0}")]
    MissingBoundary(String),
}

/// Errors raised while pulling frames from an open stream.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Transport failure mid-stream. Fatal; reported once to the sink.
    #[error("Stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An externally requested stop was observed during a blocking read.
    ///
    /// Not a fault: the caller suppresses it from the sink and treats it as
    /// the normal shutdown trigger.
    #[error("Stream read cancelled")]
    Cancelled,
}

impl ProtocolError {
    pub(crate) fn unexpected_eof(context: &str) -> Self {
        Self::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("stream ended {}", context),
        ))
    }

    pub(crate) fn disconnected() -> Self {
        Self::Io(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "stream source already disconnected",
        ))
    }
}
