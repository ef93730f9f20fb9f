//! Save command - write each received frame to disk

use std::path::Path;

use anyhow::{Context, Result};
use mjpeg_stream::{ConnectionTarget, StreamEvent, StreamWorker};
use tracing::debug;
use uuid::Uuid;

/// Save frames as `<uuid>.jpg` files until Ctrl+C, end of stream, or an
/// optional frame-count limit.
pub async fn save(target: ConnectionTarget, out_dir: &Path, count: Option<u64>) -> Result<()> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    eprintln!("Connecting to {} ...", target.url());
    eprintln!("Saving frames to {}", out_dir.display());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let worker = StreamWorker::spawn(target, tx);

    let mut saved: u64 = 0;
    let mut failed = false;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(StreamEvent::Frame(frame)) => {
                    let path = out_dir.join(format!("{}.jpg", Uuid::new_v4()));
                    tokio::fs::write(&path, frame.bytes())
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    debug!(path = %path.display(), len = frame.len(), "frame saved");
                    saved += 1;
                    if count.is_some_and(|limit| saved >= limit) {
                        eprintln!("Saved {} frame(s), stopping", saved);
                        worker.cancel();
                    }
                }
                Some(StreamEvent::Stats(_)) => {}
                Some(StreamEvent::Error { message }) => {
                    eprintln!("Stream failed: {}", message);
                    failed = true;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nStopping stream...");
                worker.cancel();
            }
        }
    }

    worker.join().await;
    if failed {
        anyhow::bail!("stream ended with an error");
    }
    eprintln!("Saved {} frame(s)", saved);
    Ok(())
}
