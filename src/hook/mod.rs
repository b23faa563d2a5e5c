//! After-response hook for load-test scenarios.
//!
//! When a scenario step's request parameters carry an `hls` option, the hook
//! walks the playlist tree rooted at the request URL, then downloads the
//! selected rendition through the bounded pool, emitting telemetry as it
//! goes. The returned `Result` is the step's completion signal.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hls_fetch_core::events::RecordingSink;
//! use hls_fetch_core::hook::{
//!     AfterResponseHook, HlsConfig, HlsStreamHook, RequestParams, ResponseInfo, UserContext,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let params = RequestParams::new("https://cdn.example.com/vod/master.m3u8", HlsConfig::default());
//! let events = Arc::new(RecordingSink::new());
//! HlsStreamHook::default()
//!     .run(&params, &ResponseInfo::default(), &UserContext::new(), events.clone())
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod script;
mod template;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use config::{ConfigError, HlsConfig, HlsOption, HookSettings, RequestParams};
pub use script::{PROCESSOR_NAME, Scenario, Script, ScriptConfig, register};
pub use template::UserContext;

use crate::download::{
    DownloadEngine, DownloadReport, EngineError, HttpClient, OutputMode, RetryPolicy,
};
use crate::events::EventSink;
use crate::manifest::{ManifestWalker, WalkError};
use crate::selector::StreamSelector;

/// Errors that fail a hook run.
#[derive(Debug, Error)]
pub enum HookError {
    /// The `hls` configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The playlist tree could not be resolved.
    #[error("manifest walk failed: {0}")]
    Walk(#[from] WalkError),

    /// The download phase failed.
    #[error("download failed: {0}")]
    Download(#[from] EngineError),
}

/// The response that triggered the hook.
///
/// The HLS hook re-requests the root playlist instead of reusing the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    /// HTTP status.
    pub status: u16,
    /// Body text, when the host captured it.
    pub body: Option<String>,
}

/// A processor run after each response of a scenario.
#[async_trait]
pub trait AfterResponseHook: Send + Sync {
    /// Processor name used for registration.
    fn name(&self) -> &'static str;

    /// Runs the processor; `Ok(())` completes the step, `Err` fails it.
    async fn run(
        &self,
        params: &RequestParams,
        response: &ResponseInfo,
        ctx: &UserContext,
        events: Arc<dyn EventSink>,
    ) -> Result<(), HookError>;
}

/// Outcome of an enabled hook run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Settings the run used.
    pub settings: HookSettings,
    /// Number of resources the walk produced.
    pub resources: usize,
    /// Download phase summary.
    pub report: DownloadReport,
}

/// Walks and downloads an HLS stream after a scenario response.
#[derive(Debug, Clone, Default)]
pub struct HlsStreamHook {
    client: HttpClient,
    retry_policy: RetryPolicy,
}

impl HlsStreamHook {
    /// Creates a hook using `client` for every request.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Overrides the per-resource retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Runs the hook and returns what it did.
    ///
    /// Returns `Ok(None)` without any network activity when `hls` is absent
    /// or `false`. On failure an `error` event is emitted before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`HookError`] when the configuration is invalid, the walk
    /// fails, or any download fails.
    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn execute(
        &self,
        params: &RequestParams,
        ctx: &UserContext,
        events: Arc<dyn EventSink>,
    ) -> Result<Option<StreamOutcome>, HookError> {
        let Some(config) = params.hls_config() else {
            debug!("hls option not set, skipping");
            return Ok(None);
        };

        match self.stream(&params.url, &config, ctx, Arc::clone(&events)).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                warn!(error = %e, "hls stream failed");
                events.error(&e.to_string());
                Err(e)
            }
        }
    }

    async fn stream(
        &self,
        url: &str,
        config: &HlsConfig,
        ctx: &UserContext,
        events: Arc<dyn EventSink>,
    ) -> Result<StreamOutcome, HookError> {
        let settings = config.resolve(url, ctx)?;
        let engine = DownloadEngine::new(
            settings.concurrency,
            self.retry_policy.clone(),
            settings.throttle,
        )?;

        let walker = ManifestWalker::new(
            self.client.clone(),
            StreamSelector::new(settings.policy.clone()),
        )
        .with_key_mode(settings.key_mode)
        .with_base_dir(
            settings
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
        );
        let resources = walker.walk(&settings.url).await?;

        let output = if settings.output_dir.is_some() {
            OutputMode::LocalFiles
        } else {
            OutputMode::Discard
        };
        let report = engine
            .download(&resources, &self.client, output, events)
            .await?;

        info!(
            resources = resources.len(),
            completed = report.completed,
            bytes = report.bytes,
            elapsed_ms = report.elapsed.as_millis(),
            "hls stream complete"
        );
        Ok(StreamOutcome {
            settings,
            resources: resources.len(),
            report,
        })
    }
}

#[async_trait]
impl AfterResponseHook for HlsStreamHook {
    fn name(&self) -> &'static str {
        PROCESSOR_NAME
    }

    async fn run(
        &self,
        params: &RequestParams,
        _response: &ResponseInfo,
        ctx: &UserContext,
        events: Arc<dyn EventSink>,
    ) -> Result<(), HookError> {
        self.execute(params, ctx, events).await.map(|_| ())
    }
}
