//! CLI entry point for the hls-fetch tool.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::Parser;
use hls_fetch_core::events::{
    EventSink, RecordingSink, SEGMENT_COMPLETED, SEGMENT_STARTED, TeeSink, TracingSink,
};
use hls_fetch_core::{HlsStreamHook, RequestParams, UserContext};
use tracing::{debug, info};

mod cli;
mod progress;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");
    info!(url = %args.url, "hls-fetch starting");

    let params = RequestParams::new(args.url.clone(), args.hls_config()?);

    let recorder = Arc::new(RecordingSink::new());
    let events: Arc<dyn EventSink> = Arc::new(TeeSink::new(
        Arc::clone(&recorder) as Arc<dyn EventSink>,
        Arc::new(TracingSink),
    ));

    let use_spinner = !args.quiet && io::stderr().is_terminal();
    let (progress_handle, stop) = progress::spawn_progress_ui(use_spinner, Arc::clone(&recorder));

    let result = HlsStreamHook::default()
        .execute(&params, &UserContext::new(), events)
        .await;

    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let outcome = result?;
    if let Some(outcome) = outcome {
        if !args.quiet {
            println!(
                "Resources: {}  Downloaded: {}  Skipped: {}  Retried: {}  Bytes: {}  Elapsed: {:.2}s",
                outcome.resources,
                outcome.report.completed,
                outcome.report.skipped,
                outcome.report.retried,
                outcome.report.bytes,
                outcome.report.elapsed.as_secs_f64()
            );
        }
        debug!(
            started = recorder.counter_value(SEGMENT_STARTED),
            completed = recorder.counter_value(SEGMENT_COMPLETED),
            "telemetry counters"
        );
    }

    Ok(())
}
