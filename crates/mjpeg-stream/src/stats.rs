//! Transfer statistics for one stream session

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

/// An owned, immutable view of the counters at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub frame_count: u64,
    pub error_frame_count: u64,
    pub bytes_read: u64,
    /// Elapsed session time, e.g. `"1 h 4 m 23 s"` (days prefixed only
    /// when nonzero).
    pub uptime: String,
    /// Average bandwidth, e.g. `"612 Kbps"`.
    pub bandwidth: String,
}

struct StatsInner {
    frame_count: u64,
    error_frame_count: u64,
    bytes_read: u64,
    started: Instant,
}

/// Running counters for one stream session.
///
/// All access serializes through one lock, so a reader can never observe
/// `frame_count` and `bytes_read` out of step. Counters reset only by
/// constructing a new tracker (one tracker per worker session).
pub struct StatsTracker {
    inner: Mutex<StatsInner>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                frame_count: 0,
                error_frame_count: 0,
                bytes_read: 0,
                started: Instant::now(),
            }),
        }
    }

    /// Restart the uptime clock. Called once the connection is up, so
    /// connect latency does not count against the session.
    pub fn restart(&self) {
        self.inner.lock().started = Instant::now();
    }

    /// Record one well-formed frame: count and byte total move together.
    pub fn record_frame(&self, len: usize) {
        let mut inner = self.inner.lock();
        inner.frame_count += 1;
        inner.bytes_read += len as u64;
    }

    /// Record one part whose payload could not be used.
    pub fn record_error_frame(&self) {
        self.inner.lock().error_frame_count += 1;
    }

    pub fn frame_count(&self) -> u64 {
        self.inner.lock().frame_count
    }

    pub fn error_frame_count(&self) -> u64 {
        self.inner.lock().error_frame_count
    }

    pub fn bytes_read(&self) -> u64 {
        self.inner.lock().bytes_read
    }

    /// Average bandwidth in kilobits per second since the session started.
    pub fn bandwidth_kbps(&self) -> u64 {
        let inner = self.inner.lock();
        bandwidth_kbps(inner.bytes_read, inner.started.elapsed().as_secs())
    }

    /// Elapsed session time as display text.
    pub fn uptime(&self) -> String {
        format_uptime(self.inner.lock().started.elapsed())
    }

    /// Byte total as display text, e.g. `"3.52 MiB"`.
    pub fn human_bytes(&self) -> String {
        format_human_bytes(self.inner.lock().bytes_read)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock();
        let elapsed = inner.started.elapsed();
        StatsSnapshot {
            frame_count: inner.frame_count,
            error_frame_count: inner.error_frame_count,
            bytes_read: inner.bytes_read,
            uptime: format_uptime(elapsed),
            bandwidth: format!(
                "{} Kbps",
                bandwidth_kbps(inner.bytes_read, elapsed.as_secs())
            ),
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// `bytes * 8 / 1000 / elapsed`, with zero elapsed treated as one second.
pub fn bandwidth_kbps(bytes_read: u64, elapsed_secs: u64) -> u64 {
    bytes_read * 8 / 1000 / elapsed_secs.max(1)
}

/// Days/hours/minutes/seconds, days omitted when zero.
pub fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days == 0 {
        format!("{} h {} m {} s", hours, minutes, seconds)
    } else {
        format!("{} d {} h {} m {} s", days, hours, minutes, seconds)
    }
}

/// Two-decimal GiB/MiB/KiB, thresholds at 1 GiB and 1 MiB.
pub fn format_human_bytes(bytes: u64) -> String {
    if bytes > GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes > MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    }
}
