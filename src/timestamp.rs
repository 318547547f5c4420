//! Periodic timestamp writer.
//!
//! A single long-lived task appends one `timestamp:<RFC-1123-style>\n`
//! record to the log at a fixed period (default ten seconds, measured
//! against the runtime's monotonic clock) until shutdown is signalled. The
//! server only spawns it for the in-process backend; the character device
//! performs its own lifecycle and gets no injected records.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, warn};
use tokio::sync::watch;

use crate::backend::LogBackend;

/// Leading bytes of every injected record.
pub const TIMESTAMP_PREFIX: &str = "timestamp:";

/// Formats one complete timestamp record for `now`.
pub fn format_timestamp_record(now: DateTime<Local>) -> String {
    format!("{}{}\n", TIMESTAMP_PREFIX, now.format("%a, %d %b %Y %H:%M:%S %z"))
}

/// Appends a timestamp record every `period` until `shutdown` flips.
///
/// Append failures are logged and the task keeps running; a single failed
/// injection must not take the writer down with it.
pub async fn run_injector(
    backend: Arc<dyn LogBackend>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    // The first interval tick completes immediately; discard it so the
    // first record lands a full period in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let record = format_timestamp_record(Local::now());
                match backend.append(record.as_bytes()) {
                    Ok(written) => debug!("injected timestamp record ({} bytes)", written),
                    Err(err) => warn!("timestamp append failed: {}", err),
                }
            }
            _ = shutdown.changed() => {
                debug!("timestamp writer stopping");
                return;
            }
        }
    }
}
