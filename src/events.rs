//! Telemetry sink for counter and custom-stat events.
//!
//! The host scenario framework owns the real sink; this crate only needs
//! emit-and-forget semantics. The sink is passed explicitly to every call
//! that emits, and must be safe for concurrent use by download workers.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::{debug, error};

/// Counter emitted immediately before a resource fetch is issued.
pub const SEGMENT_STARTED: &str = "HLS: segment download started";

/// Counter emitted once a resource fetch has settled (success or final failure).
pub const SEGMENT_COMPLETED: &str = "HLS: segment download completed";

/// Stat label for a single resource fetch duration.
pub const SEGMENT_DOWNLOAD_TIME: &str = "HLS: segment download time";

/// Stat label for the whole download phase duration.
pub const STREAM_DOWNLOAD_TIME: &str = "HLS: stream download time";

/// Destination for telemetry events.
pub trait EventSink: Send + Sync {
    /// Increments the counter `name` by `value`.
    fn counter(&self, name: &str, value: u64);

    /// Records a custom stat in milliseconds.
    fn custom_stat(&self, stat: &str, value_ms: u64);

    /// Reports a failure of the scenario step.
    fn error(&self, message: &str);
}

/// A recorded custom stat event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatEvent {
    /// Stat label.
    pub stat: String,
    /// Value in milliseconds.
    pub value: u64,
}

/// In-memory sink that records every event.
///
/// Used by tests and by the CLI summary.
#[derive(Debug, Default)]
pub struct RecordingSink {
    counters: DashMap<String, u64>,
    stats: Mutex<Vec<StatEvent>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value of counter `name` (0 if never emitted).
    #[must_use]
    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters.get(name).map_or(0, |v| *v)
    }

    /// Returns all stat events recorded under `stat`, in emission order.
    #[must_use]
    pub fn stats_for(&self, stat: &str) -> Vec<u64> {
        self.stats
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|event| event.stat == stat)
            .map(|event| event.value)
            .collect()
    }

    /// Returns every recorded stat event.
    #[must_use]
    pub fn stats(&self) -> Vec<StatEvent> {
        self.stats
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Returns every recorded error message.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for RecordingSink {
    fn counter(&self, name: &str, value: u64) {
        *self.counters.entry(name.to_string()).or_insert(0) += value;
    }

    fn custom_stat(&self, stat: &str, value_ms: u64) {
        self.stats
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(StatEvent {
                stat: stat.to_string(),
                value: value_ms,
            });
    }

    fn error(&self, message: &str) {
        self.errors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message.to_string());
    }
}

/// Sink that forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn counter(&self, name: &str, value: u64) {
        debug!(counter = name, value, "counter");
    }

    fn custom_stat(&self, stat: &str, value_ms: u64) {
        debug!(stat, value_ms, "custom stat");
    }

    fn error(&self, message: &str) {
        error!(message, "scenario step failed");
    }
}

/// Fans every event out to two sinks.
pub struct TeeSink {
    first: Arc<dyn EventSink>,
    second: Arc<dyn EventSink>,
}

impl TeeSink {
    /// Creates a sink that forwards to `first` then `second`.
    #[must_use]
    pub fn new(first: Arc<dyn EventSink>, second: Arc<dyn EventSink>) -> Self {
        Self { first, second }
    }
}

impl EventSink for TeeSink {
    fn counter(&self, name: &str, value: u64) {
        self.first.counter(name, value);
        self.second.counter(name, value);
    }

    fn custom_stat(&self, stat: &str, value_ms: u64) {
        self.first.custom_stat(stat, value_ms);
        self.second.custom_stat(stat, value_ms);
    }

    fn error(&self, message: &str) {
        self.first.error(message);
        self.second.error(message);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_accumulates_counters() {
        let sink = RecordingSink::new();
        sink.counter(SEGMENT_STARTED, 1);
        sink.counter(SEGMENT_STARTED, 1);
        sink.counter(SEGMENT_COMPLETED, 1);

        assert_eq!(sink.counter_value(SEGMENT_STARTED), 2);
        assert_eq!(sink.counter_value(SEGMENT_COMPLETED), 1);
        assert_eq!(sink.counter_value("never emitted"), 0);
    }

    #[test]
    fn test_recording_sink_keeps_stat_order() {
        let sink = RecordingSink::new();
        sink.custom_stat(SEGMENT_DOWNLOAD_TIME, 10);
        sink.custom_stat(STREAM_DOWNLOAD_TIME, 99);
        sink.custom_stat(SEGMENT_DOWNLOAD_TIME, 20);

        assert_eq!(sink.stats_for(SEGMENT_DOWNLOAD_TIME), vec![10, 20]);
        assert_eq!(sink.stats_for(STREAM_DOWNLOAD_TIME), vec![99]);
        assert_eq!(sink.stats().len(), 3);
    }

    #[test]
    fn test_recording_sink_thread_safe() {
        use std::thread;

        let sink = Arc::new(RecordingSink::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sink = Arc::clone(&sink);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    sink.counter(SEGMENT_STARTED, 1);
                    sink.custom_stat(SEGMENT_DOWNLOAD_TIME, 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sink.counter_value(SEGMENT_STARTED), 800);
        assert_eq!(sink.stats_for(SEGMENT_DOWNLOAD_TIME).len(), 800);
    }

    #[test]
    fn test_tee_sink_forwards_to_both() {
        let a = Arc::new(RecordingSink::new());
        let b = Arc::new(RecordingSink::new());
        let tee = TeeSink::new(a.clone(), b.clone());

        tee.counter(SEGMENT_COMPLETED, 3);
        tee.custom_stat(STREAM_DOWNLOAD_TIME, 5);
        tee.error("boom");

        for sink in [&a, &b] {
            assert_eq!(sink.counter_value(SEGMENT_COMPLETED), 3);
            assert_eq!(sink.stats_for(STREAM_DOWNLOAD_TIME), vec![5]);
            assert_eq!(sink.errors(), vec!["boom".to_string()]);
        }
    }
}
