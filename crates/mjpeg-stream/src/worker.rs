//! Cancellable background worker driving one stream session

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::StreamConnection;
use crate::error::ProtocolError;
use crate::events::StreamEvent;
use crate::reader::MultipartFrameReader;
use crate::stats::{StatsSnapshot, StatsTracker};
use crate::target::ConnectionTarget;

/// The channel end that receives a session's events.
pub type EventSink = mpsc::UnboundedSender<StreamEvent>;

/// Session phases, logged as the worker moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Connecting,
    Streaming,
    Stopping,
    Terminated,
}

/// Handle to one stream session running on a spawned task.
///
/// The worker connects, pulls frames, keeps the statistics current, and
/// emits [`StreamEvent`]s to the sink until the stream ends, a fault
/// occurs, or [`cancel`](Self::cancel) is called. The handle is plain
/// data; it is not the task itself.
///
/// # Example
///
/// ```no_run
/// use mjpeg_stream::{ConnectionTarget, StreamEvent, StreamWorker};
///
/// # async fn example() -> anyhow::Result<()> {
/// let target = ConnectionTarget::parse("http://camera.local/mjpg/video.cgi")?;
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// let worker = StreamWorker::spawn(target, tx);
///
/// while let Some(event) = rx.recv().await {
///     match event {
///         StreamEvent::Frame(frame) => println!("frame: {} bytes", frame.len()),
///         StreamEvent::Stats(stats) => println!("{} frames", stats.frame_count),
///         StreamEvent::Error { message } => eprintln!("{message}"),
///     }
/// }
/// worker.join().await;
/// # Ok(())
/// # }
/// ```
pub struct StreamWorker {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
    stats: Arc<StatsTracker>,
}

impl StreamWorker {
    /// Start a session for `target`, delivering events to `sink`.
    pub fn spawn(target: ConnectionTarget, sink: EventSink) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let stats = Arc::new(StatsTracker::new());
        let handle = tokio::spawn(run(target, sink, cancel_rx, Arc::clone(&stats)));
        Self {
            cancel: cancel_tx,
            handle,
            stats,
        }
    }

    /// Request a stop. Callable from any task at any time; observed at the
    /// next pull boundary, or immediately if a read is in progress.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Wait until the session has fully terminated and its connection is
    /// released.
    pub async fn join(self) {
        let _ = self.handle.await;
    }

    pub fn is_terminated(&self) -> bool {
        self.handle.is_finished()
    }

    /// Snapshot of the session's current statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

async fn run(
    target: ConnectionTarget,
    sink: EventSink,
    mut cancel: watch::Receiver<bool>,
    stats: Arc<StatsTracker>,
) {
    debug!(state = ?WorkerState::Connecting, url = %target.url(), "stream session starting");

    let connection = match StreamConnection::new() {
        Ok(connection) => connection,
        Err(e) => {
            warn!(error = %e, "failed to build HTTP client");
            let _ = sink.send(StreamEvent::Error {
                message: e.to_string(),
            });
            debug!(state = ?WorkerState::Terminated, "stream session over");
            return;
        }
    };

    let open = tokio::select! {
        result = connection.connect(&target) => match result {
            Ok(open) => open,
            Err(e) => {
                // Connect failures never reach the streaming phase; the
                // half-open response is dropped here, which closes it.
                warn!(error = %e, "connect failed");
                let _ = sink.send(StreamEvent::Error {
                    message: e.to_string(),
                });
                debug!(state = ?WorkerState::Terminated, "stream session over");
                return;
            }
        },
        _ = cancel.wait_for(|&flagged| flagged) => {
            debug!(state = ?WorkerState::Terminated, "cancelled while connecting");
            return;
        }
    };

    stats.restart();
    let mut reader = MultipartFrameReader::with_cancel(open, cancel.clone());
    debug!(state = ?WorkerState::Streaming, "connected");

    loop {
        if *cancel.borrow() {
            debug!("cancellation observed at pull boundary");
            break;
        }

        match reader.next_frame().await {
            None => {
                debug!("stream exhausted by terminal boundary");
                break;
            }
            Some(Ok(frame)) => {
                if frame.is_empty() {
                    stats.record_error_frame();
                } else {
                    stats.record_frame(frame.len());
                    let _ = sink.send(StreamEvent::Frame(frame));
                }
                // Per-frame, unthrottled. Simple, and cheap relative to
                // the frame payloads themselves.
                let _ = sink.send(StreamEvent::Stats(stats.snapshot()));
            }
            Some(Err(ProtocolError::Cancelled)) => {
                debug!("cancellation observed mid-read");
                break;
            }
            Some(Err(e)) => {
                warn!(error = %e, "stream fault");
                let _ = sink.send(StreamEvent::Error {
                    message: e.to_string(),
                });
                break;
            }
        }
    }

    debug!(state = ?WorkerState::Stopping, "releasing connection");
    reader.disconnect();
    debug!(state = ?WorkerState::Terminated, "stream session over");
}

/// Owns at most one live [`StreamWorker`].
///
/// Starting a new stream first cancels and fully joins the previous
/// worker, guaranteeing at most one live connection and deterministic
/// release of the old socket before the new one opens.
#[derive(Default)]
pub struct StreamSession {
    current: Option<StreamWorker>,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any running worker with a fresh one for `target`.
    pub async fn start(&mut self, target: ConnectionTarget, sink: EventSink) -> &StreamWorker {
        self.stop().await;
        self.current.insert(StreamWorker::spawn(target, sink))
    }

    /// Cancel and join the running worker, if any.
    pub async fn stop(&mut self) {
        if let Some(worker) = self.current.take() {
            worker.cancel();
            worker.join().await;
        }
    }

    pub fn worker(&self) -> Option<&StreamWorker> {
        self.current.as_ref()
    }
}
