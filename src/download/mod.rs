//! Download phase: HTTP client, retry, throttling and the bounded pool.
//!
//! # Features
//!
//! - Whole-body fetches for manifests and keys
//! - Streaming fetches for segments, written to disk or drained
//! - 60 second request timeout and one fixed-delay retry per resource
//! - Per-response bandwidth throttling
//! - Fail-fast pool bounded by a semaphore
//!
//! # Example
//!
//! ```no_run
//! use hls_fetch_core::download::HttpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let bytes = client
//!     .fetch_to_sink("https://cdn.example.com/vod/seg0.ts", None, None)
//!     .await?;
//! println!("Received {bytes} bytes");
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod retry;
pub mod throttle;

pub use client::HttpClient;
pub use constants::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
pub use engine::{DownloadEngine, DownloadReport, DownloadStats, EngineError, OutputMode};
pub use error::DownloadError;
pub use retry::{RetryDecision, RetryPolicy};
pub use throttle::{BandwidthSampler, ResponsePacer, Throttle};
