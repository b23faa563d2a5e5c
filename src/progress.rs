//! Progress UI (spinner) for download runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hls_fetch_core::RecordingSink;
use hls_fetch_core::events::{SEGMENT_COMPLETED, SEGMENT_STARTED};
use indicatif::{ProgressBar, ProgressStyle};

/// Spawns the spinner when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    events: Arc<RecordingSink>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(events, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    events: Arc<RecordingSink>,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            let started = events.counter_value(SEGMENT_STARTED);
            let completed = events.counter_value(SEGMENT_COMPLETED);
            let message = if started == 0 {
                "Resolving manifest tree...".to_string()
            } else {
                format!("[{completed}/{started}] Downloading segments...")
            };
            spinner.set_message(message);
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}
