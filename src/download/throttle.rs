//! Per-response bandwidth throttling.
//!
//! Each in-flight response gets its own [`ResponsePacer`]; there is no
//! pool-wide budget. A pacer sleeps after each chunk so the cumulative byte
//! count never runs ahead of `rate * elapsed`, and samples the achieved
//! bandwidth over a rolling window for debug logging.
//!
//! # Example
//!
//! ```
//! use hls_fetch_core::download::Throttle;
//!
//! assert!(Throttle::new(0).is_none());
//! let throttle = Throttle::new(64 * 1024).unwrap();
//! assert_eq!(throttle.bytes_per_second(), 65_536);
//! ```

use std::num::NonZeroU64;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::constants::BANDWIDTH_SAMPLE_WINDOW;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Bytes-per-second cap applied to every response body independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    bytes_per_second: NonZeroU64,
}

impl Throttle {
    /// Creates a throttle; a zero rate means unbounded and yields `None`.
    #[must_use]
    pub fn new(bytes_per_second: u64) -> Option<Self> {
        NonZeroU64::new(bytes_per_second).map(|bytes_per_second| Self { bytes_per_second })
    }

    /// Returns the configured rate.
    #[must_use]
    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second.get()
    }

    /// Starts pacing a new response body.
    #[must_use]
    pub fn pacer(&self) -> ResponsePacer {
        ResponsePacer::new(*self, Instant::now())
    }
}

/// Paces one response body to its throttle.
#[derive(Debug)]
pub struct ResponsePacer {
    throttle: Throttle,
    started: Instant,
    consumed: u64,
    sampler: BandwidthSampler,
}

impl ResponsePacer {
    fn new(throttle: Throttle, started: Instant) -> Self {
        Self {
            throttle,
            started,
            consumed: 0,
            sampler: BandwidthSampler::new(BANDWIDTH_SAMPLE_WINDOW, started),
        }
    }

    /// Records `chunk_len` more bytes and returns how long to wait at `now`.
    pub fn delay_for(&mut self, chunk_len: usize, now: Instant) -> Duration {
        self.consumed = self.consumed.saturating_add(chunk_len as u64);
        if let Some(average) = self.sampler.record(chunk_len as u64, now) {
            debug!(
                bytes_per_second = average,
                limit = self.throttle.bytes_per_second(),
                "avg bandwidth"
            );
        }

        let target_nanos = u128::from(self.consumed) * NANOS_PER_SEC
            / u128::from(self.throttle.bytes_per_second());
        let target = Duration::from_nanos(u64::try_from(target_nanos).unwrap_or(u64::MAX));
        target.saturating_sub(now.saturating_duration_since(self.started))
    }

    /// Records a received chunk and sleeps until the body is back under its rate.
    pub async fn consume(&mut self, chunk_len: usize) {
        let delay = self.delay_for(chunk_len, Instant::now());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Rolling-window bandwidth average.
#[derive(Debug)]
pub struct BandwidthSampler {
    window: Duration,
    window_start: Instant,
    bytes: u64,
}

impl BandwidthSampler {
    /// Creates a sampler whose first window opens at `now`.
    #[must_use]
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            window_start: now,
            bytes: 0,
        }
    }

    /// Adds `bytes`; once the window has elapsed returns the average rate and starts a new window.
    pub fn record(&mut self, bytes: u64, now: Instant) -> Option<u64> {
        self.bytes = self.bytes.saturating_add(bytes);
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        let nanos = elapsed.as_nanos().max(1);
        let average = u128::from(self.bytes) * NANOS_PER_SEC / nanos;
        self.window_start = now;
        self.bytes = 0;
        Some(u64::try_from(average).unwrap_or(u64::MAX))
    }
}
