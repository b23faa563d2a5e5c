//! Constants for the download module (timeouts, retry, pool bounds).

use std::time::Duration;

/// HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Idle timeout for response headers and for each body chunk (60 seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Attempts per resource, including the initial one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Fixed pause before the retry of a failed fetch.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default number of concurrent fetches.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Maximum allowed concurrency to prevent resource exhaustion.
pub const MAX_CONCURRENCY: usize = 100;

/// Window over which throttled responses report their average bandwidth.
pub const BANDWIDTH_SAMPLE_WINDOW: Duration = Duration::from_secs(5);
