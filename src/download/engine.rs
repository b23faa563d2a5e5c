//! Bounded-concurrency download pool for a walked resource list.
//!
//! The engine fetches every [`Resource`] that still needs fetching, with at
//! most `concurrency` requests in flight, one fixed-delay retry per item and
//! an optional per-response throttle. Telemetry is emitted through an
//! [`EventSink`] as each item starts and settles.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hls_fetch_core::download::{DownloadEngine, HttpClient, OutputMode, RetryPolicy};
//! use hls_fetch_core::events::TracingSink;
//!
//! # async fn example(resources: Vec<hls_fetch_core::manifest::Resource>) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(4, RetryPolicy::default(), None)?;
//! let report = engine
//!     .download(&resources, &HttpClient::new(), OutputMode::Discard, Arc::new(TracingSink))
//!     .await?;
//! println!("Completed: {}, Bytes: {}", report.completed, report.bytes);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::constants::MAX_CONCURRENCY;
use super::retry::{RetryDecision, RetryPolicy};
use super::throttle::Throttle;
use super::{DownloadError, HttpClient};
use crate::events::{
    EventSink, SEGMENT_COMPLETED, SEGMENT_DOWNLOAD_TIME, SEGMENT_STARTED, STREAM_DOWNLOAD_TIME,
};
use crate::manifest::{Resource, ResourceKind};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Error type for download phase operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// A resource failed after every attempt.
    #[error("{kind} download failed: {source}")]
    Download {
        /// Kind of the failed resource.
        kind: ResourceKind,
        /// The final error.
        #[source]
        source: DownloadError,
    },

    /// A rewritten manifest could not be written to disk.
    #[error("failed to write manifest {path}: {source}")]
    Io {
        /// Manifest local file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A download task panicked.
    #[error("download task panicked: {message}")]
    TaskPanicked {
        /// Join error text.
        message: String,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Where fetched bodies go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Drain every body and keep nothing.
    Discard,
    /// Write every resource to its local file, creating directories.
    LocalFiles,
}

/// Live counters of a download phase.
///
/// Uses atomic counters for thread-safe updates from concurrent download tasks.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    bytes: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of successfully completed fetches.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of fetches that failed after every attempt.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of retry attempts made.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Returns the body bytes received.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Returns the highest number of simultaneous fetches observed.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn fetch_started(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn fetch_settled(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn record_completed(&self, bytes: u64) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }
}

/// Summary of a successful download phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    /// Resources fetched.
    pub completed: usize,
    /// Retries performed.
    pub retried: usize,
    /// Resources skipped because they already carried content.
    pub skipped: usize,
    /// Body bytes received.
    pub bytes: u64,
    /// Highest number of simultaneous fetches.
    pub peak_in_flight: usize,
    /// Wall time of the whole phase.
    pub elapsed: Duration,
}

/// First failure observed across the pool.
#[derive(Debug, Default)]
struct FailFast {
    tripped: AtomicBool,
    first: Mutex<Option<EngineError>>,
}

impl FailFast {
    fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    fn trip(&self, error: EngineError) {
        let mut first = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            *first = Some(error);
        }
        self.tripped.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> Option<EngineError> {
        self.first
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Download engine for the flat resource list of a walk.
///
/// # Concurrency Model
///
/// - Each fetch runs in its own Tokio task
/// - A semaphore permit is acquired before spawning each fetch
/// - Permits are released automatically when fetches settle (RAII)
/// - After the first final failure no new fetch is dispatched; fetches
///   already in flight run to completion
#[derive(Debug)]
pub struct DownloadEngine {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Configured concurrency limit.
    concurrency: usize,
    /// Retry policy for failed fetches.
    retry_policy: RetryPolicy,
    /// Per-response bandwidth cap.
    throttle: Option<Throttle>,
}

impl DownloadEngine {
    /// Creates a new download engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is outside 1-100.
    #[instrument(level = "debug", skip(retry_policy))]
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        throttle: Option<Throttle>,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            throttle_bps = throttle.map(|t| t.bytes_per_second()),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            throttle,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the configured throttle, if any.
    #[must_use]
    pub fn throttle(&self) -> Option<Throttle> {
        self.throttle
    }

    /// Fetches every resource that still needs fetching.
    ///
    /// Manifests that already carry content are not fetched; with
    /// [`OutputMode::LocalFiles`] their content is written to their local
    /// file before any fetch starts.
    ///
    /// The `stream download time` stat is emitted once, whether the phase
    /// succeeds or fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure across the pool: [`EngineError::Download`]
    /// for a resource that failed every attempt, [`EngineError::Io`] when a
    /// manifest cannot be written, [`EngineError::TaskPanicked`] when a task
    /// dies.
    #[instrument(skip(self, resources, client, events), fields(resources = resources.len()))]
    pub async fn download(
        &self,
        resources: &[Resource],
        client: &HttpClient,
        output: OutputMode,
        events: Arc<dyn EventSink>,
    ) -> Result<DownloadReport, EngineError> {
        let started = Instant::now();
        let result = self.run(resources, client, output, &events).await;
        events.custom_stat(STREAM_DOWNLOAD_TIME, elapsed_ms(started));
        result.map(|mut report| {
            report.elapsed = started.elapsed();
            report
        })
    }

    async fn run(
        &self,
        resources: &[Resource],
        client: &HttpClient,
        output: OutputMode,
        events: &Arc<dyn EventSink>,
    ) -> Result<DownloadReport, EngineError> {
        if output == OutputMode::LocalFiles {
            write_inline_manifests(resources).await?;
        }

        let pending: Vec<&Resource> = resources.iter().filter(|r| r.needs_fetch()).collect();
        let skipped = resources.len() - pending.len();
        let stats = Arc::new(DownloadStats::new());
        let fail_fast = Arc::new(FailFast::default());
        let mut handles = Vec::with_capacity(pending.len());

        info!(pending = pending.len(), skipped, "starting download phase");

        for resource in pending {
            if fail_fast.is_tripped() {
                break;
            }

            // Acquire semaphore permit (blocks if at concurrency limit)
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            // A sibling may have failed while we waited for the permit.
            if fail_fast.is_tripped() {
                break;
            }

            let Some(url) = resource.uri.clone() else {
                continue;
            };
            let kind = resource.kind;
            let destination =
                (output == OutputMode::LocalFiles).then(|| resource.local_file.clone());
            let client = client.clone();
            let stats = Arc::clone(&stats);
            let fail_fast = Arc::clone(&fail_fast);
            let events = Arc::clone(events);
            let retry_policy = self.retry_policy.clone();
            let throttle = self.throttle;

            handles.push(tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII)
                let _permit = permit;

                events.counter(SEGMENT_STARTED, 1);
                stats.fetch_started();
                let item_started = Instant::now();

                let result = fetch_with_retry(
                    &client,
                    &url,
                    destination.as_deref(),
                    throttle,
                    &retry_policy,
                    &stats,
                )
                .await;

                stats.fetch_settled();
                events.counter(SEGMENT_COMPLETED, 1);
                events.custom_stat(SEGMENT_DOWNLOAD_TIME, elapsed_ms(item_started));

                match result {
                    Ok(bytes) => {
                        debug!(%url, %kind, bytes, "download completed");
                        stats.record_completed(bytes);
                    }
                    Err((source, attempts)) => {
                        warn!(
                            %url,
                            %kind,
                            error = %source,
                            attempts,
                            "download failed after all attempts"
                        );
                        stats.record_failed();
                        fail_fast.trip(EngineError::Download { kind, source });
                    }
                }
            }));
        }

        debug!(
            task_count = handles.len(),
            "waiting for downloads to complete"
        );

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "download task panicked");
                fail_fast.trip(EngineError::TaskPanicked {
                    message: e.to_string(),
                });
            }
        }

        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            retried = stats.retried(),
            bytes = stats.bytes(),
            "download phase complete"
        );

        if let Some(error) = fail_fast.take() {
            return Err(error);
        }

        Ok(DownloadReport {
            completed: stats.completed(),
            retried: stats.retried(),
            skipped,
            bytes: stats.bytes(),
            peak_in_flight: stats.peak_in_flight(),
            elapsed: Duration::ZERO,
        })
    }
}

async fn write_inline_manifests(resources: &[Resource]) -> Result<(), EngineError> {
    for resource in resources {
        let Some(content) = resource.content.as_deref() else {
            continue;
        };
        let path = &resource.local_file;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| EngineError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|source| EngineError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "wrote manifest");
    }
    Ok(())
}

/// Fetches one resource, retrying per the policy.
///
/// # Returns
///
/// - `Ok(u64)` - Body bytes received on success
/// - `Err((DownloadError, u32))` - Final error and total attempt count on failure
async fn fetch_with_retry(
    client: &HttpClient,
    url: &str,
    destination: Option<&std::path::Path>,
    throttle: Option<Throttle>,
    policy: &RetryPolicy,
    stats: &DownloadStats,
) -> Result<u64, (DownloadError, u32)> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(url, attempt, "attempting download");

        match client.fetch_to_sink(url, destination, throttle).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => match policy.should_retry(attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        url,
                        attempt = next_attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "retrying download"
                    );
                    stats.record_retry();
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url, %reason, "not retrying download");
                    return Err((e, attempt));
                }
            },
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::download::constants::DEFAULT_CONCURRENCY;

    #[test]
    fn test_engine_new_valid_concurrency() {
        for value in [1, DEFAULT_CONCURRENCY, 100] {
            let engine = DownloadEngine::new(value, RetryPolicy::default(), None).unwrap();
            assert_eq!(engine.concurrency(), value);
        }
    }

    #[test]
    fn test_engine_new_invalid_concurrency() {
        assert!(matches!(
            DownloadEngine::new(0, RetryPolicy::default(), None),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(matches!(
            DownloadEngine::new(101, RetryPolicy::default(), None),
            Err(EngineError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_engine_stores_policy_and_throttle() {
        let engine = DownloadEngine::new(
            2,
            RetryPolicy::new(5, Duration::ZERO),
            Throttle::new(1024),
        )
        .unwrap();
        assert_eq!(engine.retry_policy().max_attempts(), 5);
        assert_eq!(engine.throttle().unwrap().bytes_per_second(), 1024);
    }

    #[test]
    fn test_download_stats_tracks_peak_in_flight() {
        let stats = DownloadStats::new();
        stats.fetch_started();
        stats.fetch_started();
        stats.fetch_settled();
        stats.fetch_started();
        stats.fetch_settled();
        stats.fetch_settled();
        assert_eq!(stats.peak_in_flight(), 2);
    }

    #[test]
    fn test_download_stats_thread_safe() {
        use std::thread;

        let stats = Arc::new(DownloadStats::new());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.record_completed(2);
                    stats.record_failed();
                    stats.record_retry();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.completed(), 1000);
        assert_eq!(stats.failed(), 1000);
        assert_eq!(stats.retried(), 1000);
        assert_eq!(stats.bytes(), 2000);
    }

    #[test]
    fn test_fail_fast_keeps_first_error() {
        let fail_fast = FailFast::default();
        assert!(!fail_fast.is_tripped());
        fail_fast.trip(EngineError::TaskPanicked {
            message: "first".to_string(),
        });
        fail_fast.trip(EngineError::SemaphoreClosed);
        assert!(fail_fast.is_tripped());
        match fail_fast.take() {
            Some(EngineError::TaskPanicked { message }) => assert_eq!(message, "first"),
            other => panic!("expected first error, got {other:?}"),
        }
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidConcurrency { value: 0 }.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains("100"));

        let msg = EngineError::Download {
            kind: ResourceKind::Segment,
            source: DownloadError::http_status("https://h/seg.ts", 500),
        }
        .to_string();
        assert!(msg.starts_with("segment download failed"), "{msg}");
        assert!(msg.contains("500"), "{msg}");
    }

    #[tokio::test]
    async fn test_download_skips_inline_manifests() {
        let resources = vec![Resource {
            kind: ResourceKind::Manifest,
            uri: Some("https://h/master.m3u8".to_string()),
            local_file: PathBuf::from("master.m3u8"),
            content: Some("#EXTM3U\n".to_string()),
            key: None,
            iv: None,
        }];
        let sink = Arc::new(crate::events::RecordingSink::new());
        let engine = DownloadEngine::new(1, RetryPolicy::default(), None).unwrap();

        let report = engine
            .download(&resources, &HttpClient::new(), OutputMode::Discard, sink.clone())
            .await
            .unwrap();

        assert_eq!(report.completed, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(sink.counter_value(SEGMENT_STARTED), 0);
        assert_eq!(sink.stats_for(STREAM_DOWNLOAD_TIME).len(), 1);
    }
}
