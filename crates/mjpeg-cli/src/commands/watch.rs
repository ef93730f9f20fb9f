//! Watch command - print per-frame stream statistics

use anyhow::Result;
use mjpeg_stream::{format_human_bytes, ConnectionTarget, StreamEvent, StreamWorker};

/// Watch a stream until Ctrl+C or end of stream, printing a stats line
/// after every frame.
pub async fn watch(target: ConnectionTarget, json: bool) -> Result<()> {
    eprintln!("Connecting to {} ...", target.url());
    eprintln!("Press Ctrl+C to stop");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let worker = StreamWorker::spawn(target, tx);

    let mut failed = false;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(StreamEvent::Frame(_)) => {}
                Some(StreamEvent::Stats(stats)) => {
                    if json {
                        println!("{}", serde_json::to_string(&stats)?);
                    } else {
                        println!(
                            "frames {:>6}  errors {:>3}  read {:>10}  {:>10}  up {}",
                            stats.frame_count,
                            stats.error_frame_count,
                            format_human_bytes(stats.bytes_read),
                            stats.bandwidth,
                            stats.uptime,
                        );
                    }
                }
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
    eprintln!("Stream ended");
    Ok(())
}
