//! HLS Fetch Core Library
//!
//! Resolves an HLS manifest tree and downloads one rendition of it under
//! load-test conditions: bounded concurrency, optional per-response
//! throttling, a single retry per item and per-item telemetry.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`uri`] - Absolute/relative URI handling and query propagation
//! - [`manifest`] - Playlist model, key handling and the recursive tree walker
//! - [`selector`] - Child playlist selection policies
//! - [`download`] - HTTP client, retry, throttling and the bounded download pool
//! - [`events`] - Telemetry sink for counters and timing stats
//! - [`hook`] - After-response hook contract, configuration and registration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod events;
pub mod hook;
pub mod manifest;
pub mod selector;
pub mod uri;

mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use download::{
    DEFAULT_CONCURRENCY, DownloadEngine, DownloadError, DownloadReport, EngineError, HttpClient,
    OutputMode, RetryPolicy, Throttle,
};
pub use events::{EventSink, RecordingSink, TracingSink};
pub use hook::{AfterResponseHook, HlsConfig, HlsStreamHook, HookError, RequestParams, UserContext};
pub use manifest::{KeyMode, ManifestWalker, Resource, ResourceKind, WalkError};
pub use selector::{SelectionPolicy, StreamSelector};
