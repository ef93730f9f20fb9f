//! Event and frame value types delivered to the sink

use bytes::Bytes;

use crate::stats::StatsSnapshot;

/// One part's binary payload (a JPEG image) extracted from the stream.
///
/// Produced once, consumed once; ownership transfers to the sink on
/// emission. A frame with no payload marks a part whose `Content-Length`
/// was missing or unparseable (the lenient recovery path).
#[derive(Debug, Clone)]
pub struct Frame {
    bytes: Bytes,
    declared_len: usize,
}

impl Frame {
    pub fn new(bytes: Bytes, declared_len: usize) -> Self {
        Self {
            bytes,
            declared_len,
        }
    }

    /// A zero-length frame, standing in for a part with unusable metadata.
    pub fn empty() -> Self {
        Self {
            bytes: Bytes::new(),
            declared_len: 0,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The length declared by the part's `Content-Length` header.
    pub fn declared_len(&self) -> usize {
        self.declared_len
    }
}

/// Events emitted by a [`StreamWorker`](crate::StreamWorker).
///
/// Immutable values delivered over the sink channel; stats are
/// snapshotted at emission time, never live references.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A well-formed frame was extracted from the stream.
    Frame(Frame),
    /// Running transfer statistics, emitted after every processed frame.
    Stats(StatsSnapshot),
    /// A fatal session fault; emitted at most once per session.
    Error { message: String },
}
