//! Scenario request parameters and their validation.
//!
//! The `hls` object arrives as JSON inside a scenario's request parameters.
//! [`HlsConfig::resolve`] renders its templated values against the user
//! context and turns it into the typed [`HookSettings`] a run needs.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::template::UserContext;
use crate::download::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, Throttle};
use crate::manifest::KeyMode;
use crate::selector::{SelectionPolicy, SelectorConfig};

/// Errors from configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `concurrency` is not an integer in range.
    #[error("invalid concurrency '{value}': must be an integer between 1 and {MAX_CONCURRENCY}")]
    InvalidConcurrency {
        /// The value as written (after template rendering).
        value: String,
    },

    /// The request parameters are not valid JSON of the expected shape.
    #[error("invalid request parameters: {source}")]
    Parse {
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    fn invalid_concurrency(value: impl Into<String>) -> Self {
        Self::InvalidConcurrency {
            value: value.into(),
        }
    }
}

/// The `hls` configuration object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HlsConfig {
    /// Child playlist selection; absent means random.
    #[serde(default)]
    pub stream_selector: Option<SelectorConfig>,
    /// Worker count, a number or a templated string.
    #[serde(default)]
    pub concurrency: Option<Value>,
    /// Per-response bytes/second cap, a number or a templated string.
    #[serde(default)]
    pub throttle: Option<Value>,
    /// Fetch keys during the walk and strip key tags.
    #[serde(default)]
    pub decrypt: bool,
    /// Where to write the tree; absent means bodies are discarded.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// The `hls` request parameter: `true`, `false` or a configuration object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HlsOption {
    /// `true` enables the hook with defaults; `false` disables it.
    Enabled(bool),
    /// Explicit configuration.
    Config(HlsConfig),
}

impl HlsOption {
    /// Returns the effective configuration, or `None` when disabled.
    #[must_use]
    pub fn config(&self) -> Option<HlsConfig> {
        match self {
            Self::Enabled(true) => Some(HlsConfig::default()),
            Self::Enabled(false) => None,
            Self::Config(config) => Some(config.clone()),
        }
    }
}

/// Request parameters handed to the hook.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestParams {
    /// Root playlist URL, possibly templated.
    pub url: String,
    /// HLS options; absent means the hook does nothing.
    #[serde(default)]
    pub hls: Option<HlsOption>,
}

impl RequestParams {
    /// Creates parameters with the hook enabled by `config`.
    #[must_use]
    pub fn new(url: impl Into<String>, config: HlsConfig) -> Self {
        Self {
            url: url.into(),
            hls: Some(HlsOption::Config(config)),
        }
    }

    /// Parses parameters from a scenario's JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the value has the wrong shape.
    pub fn from_json(value: Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|source| ConfigError::Parse { source })
    }

    /// Returns the effective configuration, or `None` when the hook is disabled.
    #[must_use]
    pub fn hls_config(&self) -> Option<HlsConfig> {
        self.hls.as_ref().and_then(HlsOption::config)
    }
}

/// Typed, validated settings for one hook run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSettings {
    /// Rendered root playlist URL.
    pub url: String,
    /// Child playlist selection.
    pub policy: SelectionPolicy,
    /// Download workers, 1 to 100.
    pub concurrency: usize,
    /// Per-response cap; `None` is unbounded.
    pub throttle: Option<Throttle>,
    /// Key handling.
    pub key_mode: KeyMode,
    /// Output directory; `None` discards bodies.
    pub output_dir: Option<PathBuf>,
}

impl HlsConfig {
    /// Renders templated values and validates them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConcurrency`] when `concurrency` is not
    /// an integer between 1 and 100.
    pub fn resolve(&self, url: &str, ctx: &UserContext) -> Result<HookSettings, ConfigError> {
        let settings = HookSettings {
            url: ctx.render(url),
            policy: self
                .stream_selector
                .as_ref()
                .map(SelectionPolicy::from)
                .unwrap_or_default(),
            concurrency: resolve_concurrency(self.concurrency.as_ref(), ctx)?,
            throttle: resolve_throttle(self.throttle.as_ref(), ctx),
            key_mode: KeyMode::from(self.decrypt),
            output_dir: self.output_dir.clone(),
        };
        debug!(
            url = %settings.url,
            policy = %settings.policy,
            concurrency = settings.concurrency,
            throttle_bps = settings.throttle.map(|t| t.bytes_per_second()),
            "resolved hls settings"
        );
        Ok(settings)
    }
}

fn resolve_concurrency(value: Option<&Value>, ctx: &UserContext) -> Result<usize, ConfigError> {
    let (written, parsed) = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_CONCURRENCY),
        Some(Value::Number(n)) => (
            n.to_string(),
            n.as_u64().and_then(|n| usize::try_from(n).ok()),
        ),
        Some(Value::String(s)) => {
            let rendered = ctx.render(s);
            let parsed = rendered.trim().parse::<usize>().ok();
            (rendered, parsed)
        }
        Some(other) => (other.to_string(), None),
    };
    parsed
        .filter(|n| (1..=MAX_CONCURRENCY).contains(n))
        .ok_or_else(|| ConfigError::invalid_concurrency(written))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn resolve_throttle(value: Option<&Value>, ctx: &UserContext) -> Option<Throttle> {
    let rate = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => ctx.render(s).trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !rate.is_finite() || rate < 1.0 {
        return None;
    }
    Throttle::new(rate.ceil() as u64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::selector::{BandwidthTarget, IndexTarget};

    fn config(value: Value) -> HlsConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_hls_option_variants() {
        let enabled = RequestParams::from_json(json!({"url": "u", "hls": true})).unwrap();
        assert_eq!(enabled.hls_config(), Some(HlsConfig::default()));

        let disabled = RequestParams::from_json(json!({"url": "u", "hls": false})).unwrap();
        assert_eq!(disabled.hls_config(), None);

        let absent = RequestParams::from_json(json!({"url": "u"})).unwrap();
        assert_eq!(absent.hls_config(), None);

        let object = RequestParams::from_json(json!({
            "url": "u",
            "hls": {"concurrency": 8, "decrypt": true, "outputDir": "out"}
        }))
        .unwrap();
        let config = object.hls_config().unwrap();
        assert!(config.decrypt);
        assert_eq!(config.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_negative_selector_index_resolves_to_first_stream() {
        let params = RequestParams::from_json(json!({
            "url": "https://cdn.example.com/master.m3u8",
            "hls": {"streamSelector": {"index": -1}}
        }))
        .unwrap();

        let settings = params
            .hls_config()
            .unwrap()
            .resolve(&params.url, &UserContext::new())
            .unwrap();
        assert_eq!(settings.policy, SelectionPolicy::Index(IndexTarget::At(0)));
    }

    #[test]
    fn test_from_json_rejects_missing_url() {
        let result = RequestParams::from_json(json!({"hls": true}));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = HlsConfig::default()
            .resolve("https://h/master.m3u8", &UserContext::new())
            .unwrap();
        assert_eq!(settings.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.throttle, None);
        assert_eq!(settings.policy, SelectionPolicy::Random);
        assert_eq!(settings.key_mode, KeyMode::PassThrough);
        assert_eq!(settings.output_dir, None);
    }

    #[test]
    fn test_resolve_renders_templates() {
        let ctx = UserContext::new()
            .with_var("host", "cdn.example.com")
            .with_var("workers", "12")
            .with_var("cap", 50_000);
        let settings = config(json!({
            "concurrency": "{{ workers }}",
            "throttle": "{{ cap }}",
            "streamSelector": {"bandwidth": "max"}
        }))
        .resolve("https://{{ host }}/master.m3u8", &ctx)
        .unwrap();

        assert_eq!(settings.url, "https://cdn.example.com/master.m3u8");
        assert_eq!(settings.concurrency, 12);
        assert_eq!(settings.throttle.map(|t| t.bytes_per_second()), Some(50_000));
        assert_eq!(
            settings.policy,
            SelectionPolicy::Bandwidth(BandwidthTarget::Max)
        );
    }

    #[test]
    fn test_resolve_rejects_out_of_range_concurrency() {
        for value in [json!(0), json!(101), json!("many"), json!(2.5), json!(true)] {
            let result = config(json!({ "concurrency": value })).resolve("u", &UserContext::new());
            assert!(
                matches!(result, Err(ConfigError::InvalidConcurrency { .. })),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn test_unusable_throttle_is_unbounded() {
        for value in [json!(0), json!(-5), json!("fast"), json!({"rate": 1})] {
            let settings = config(json!({ "throttle": value }))
                .resolve("u", &UserContext::new())
                .unwrap();
            assert_eq!(settings.throttle, None, "{value} should be unbounded");
        }
        let settings = config(json!({ "throttle": 1500.2 }))
            .resolve("u", &UserContext::new())
            .unwrap();
        assert_eq!(settings.throttle.map(|t| t.bytes_per_second()), Some(1501));
    }
}
