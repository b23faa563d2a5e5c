//! Variant stream selection policies.
//!
//! A [`StreamSelector`] narrows the child playlists of a master playlist to
//! the ones the walk descends into. Every policy yields at most one stream
//! except [`SelectionPolicy::Name`], which keeps every match; the result is
//! tagged with [`Selection`] so callers see the difference.
//!
//! # Example
//!
//! ```
//! use hls_fetch_core::selector::{BandwidthTarget, SelectionPolicy, StreamSelector};
//! use hls_fetch_core::manifest::{VariantAttributes, VariantStream};
//!
//! let stream = |name: &str, bandwidth: u64| VariantStream {
//!     attributes: VariantAttributes {
//!         name: Some(name.to_string()),
//!         bandwidth: Some(bandwidth),
//!         ..VariantAttributes::default()
//!     },
//!     uri: format!("{name}.m3u8"),
//!     timeline: 0,
//! };
//! let streams = vec![stream("720", 2_000_000), stream("480", 800_000)];
//!
//! let selector = StreamSelector::new(SelectionPolicy::Bandwidth(BandwidthTarget::Max));
//! let picked = selector.select(&streams).into_streams();
//! assert_eq!(picked[0].uri, "720.m3u8");
//! ```

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::manifest::{Resolution, VariantStream};

/// Which stream a bandwidth policy picks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BandwidthTarget {
    /// Highest `BANDWIDTH`, first seen wins ties.
    Max,
    /// Lowest `BANDWIDTH`, first seen wins ties.
    Min,
    /// First stream whose `BANDWIDTH` equals the value.
    Exact(u64),
    /// Unrecognised keyword; selects nothing.
    Unknown(String),
}

/// Which stream an index policy picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTarget {
    /// Position, clamped to the last stream.
    At(usize),
    /// Uniformly random position.
    Random,
}

/// One selection policy; exactly one is active per walk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Uniformly random stream.
    #[default]
    Random,
    /// First stream whose `RESOLUTION` matches exactly.
    Resolution(Resolution),
    /// Every stream whose `NAME` matches, case-insensitively.
    Name(String),
    /// Extremal or exact `BANDWIDTH`.
    Bandwidth(BandwidthTarget),
    /// Stream by position.
    Index(IndexTarget),
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random | Self::Index(IndexTarget::Random) => f.write_str("random"),
            Self::Resolution(resolution) => write!(f, "resolution={resolution}"),
            Self::Name(name) => write!(f, "name={name}"),
            Self::Bandwidth(BandwidthTarget::Max) => f.write_str("bandwidth=max"),
            Self::Bandwidth(BandwidthTarget::Min) => f.write_str("bandwidth=min"),
            Self::Bandwidth(BandwidthTarget::Exact(value)) => write!(f, "bandwidth={value}"),
            Self::Bandwidth(BandwidthTarget::Unknown(value)) => write!(f, "bandwidth={value}"),
            Self::Index(IndexTarget::At(index)) => write!(f, "index={index}"),
        }
    }
}

/// Result of a selection, tagged by policy arity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Zero or one stream.
    Single(Option<VariantStream>),
    /// Any number of streams (name matching).
    Multiple(Vec<VariantStream>),
}

impl Selection {
    /// Streams to descend into, in order.
    #[must_use]
    pub fn into_streams(self) -> Vec<VariantStream> {
        match self {
            Self::Single(stream) => stream.into_iter().collect(),
            Self::Multiple(streams) => streams,
        }
    }

    /// Number of selected streams.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(stream) => usize::from(stream.is_some()),
            Self::Multiple(streams) => streams.len(),
        }
    }

    /// True when nothing was selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies a [`SelectionPolicy`] to candidate streams.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamSelector {
    policy: SelectionPolicy,
}

impl StreamSelector {
    /// Creates a selector for `policy`.
    #[must_use]
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    /// Returns the active policy.
    #[must_use]
    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Selects from `streams` using the thread-local RNG for random policies.
    #[must_use]
    pub fn select(&self, streams: &[VariantStream]) -> Selection {
        self.select_with_rng(streams, &mut rand::thread_rng())
    }

    /// Selects from `streams` using `rng` for random policies.
    pub fn select_with_rng<R: Rng + ?Sized>(
        &self,
        streams: &[VariantStream],
        rng: &mut R,
    ) -> Selection {
        let selection = match &self.policy {
            SelectionPolicy::Random | SelectionPolicy::Index(IndexTarget::Random) => {
                Selection::Single(pick_random(streams, rng))
            }
            SelectionPolicy::Index(IndexTarget::At(index)) => {
                let clamped = (*index).min(streams.len().saturating_sub(1));
                Selection::Single(streams.get(clamped).cloned())
            }
            SelectionPolicy::Resolution(resolution) => Selection::Single(
                streams
                    .iter()
                    .find(|s| s.attributes.resolution.as_ref() == Some(resolution))
                    .cloned(),
            ),
            SelectionPolicy::Name(name) => Selection::Multiple(
                streams
                    .iter()
                    .filter(|s| {
                        s.attributes
                            .name
                            .as_deref()
                            .unwrap_or_default()
                            .to_lowercase()
                            == name.to_lowercase()
                    })
                    .cloned()
                    .collect(),
            ),
            SelectionPolicy::Bandwidth(target) => {
                Selection::Single(select_bandwidth(streams, target))
            }
        };

        debug!(
            policy = %self.policy,
            candidates = streams.len(),
            selected = selection.len(),
            "streams selected"
        );
        selection
    }
}

fn pick_random<R: Rng + ?Sized>(streams: &[VariantStream], rng: &mut R) -> Option<VariantStream> {
    if streams.is_empty() {
        return None;
    }
    let index = rng.gen_range(0..streams.len());
    debug!(index, "random index");
    streams.get(index).cloned()
}

type Pick<'a> = Option<(u64, &'a VariantStream)>;

fn select_bandwidth(streams: &[VariantStream], target: &BandwidthTarget) -> Option<VariantStream> {
    let mut with_bandwidth = streams
        .iter()
        .filter_map(|s| s.attributes.bandwidth.map(|bandwidth| (bandwidth, s)));

    let picked = match target {
        BandwidthTarget::Max => with_bandwidth.fold(None, |best: Pick<'_>, (bw, s)| match best {
            Some((best_bw, _)) if bw <= best_bw => best,
            _ => Some((bw, s)),
        }),
        BandwidthTarget::Min => with_bandwidth.fold(None, |best: Pick<'_>, (bw, s)| match best {
            Some((best_bw, _)) if bw >= best_bw => best,
            _ => Some((bw, s)),
        }),
        BandwidthTarget::Exact(value) => with_bandwidth.find(|(bw, _)| bw == value),
        BandwidthTarget::Unknown(keyword) => {
            debug!(%keyword, "unrecognised bandwidth selector");
            None
        }
    };
    picked.map(|(_, s)| s.clone())
}

/// `bandwidth` value in a selector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BandwidthValue {
    /// Exact bandwidth.
    Number(u64),
    /// `"max"`, `"min"` or anything else.
    Text(String),
}

fn clamp_index(value: i64) -> usize {
    if value < 0 {
        0
    } else {
        usize::try_from(value).unwrap_or(usize::MAX)
    }
}

/// `index` value in a selector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    /// Position; negative values clamp to the first stream.
    Number(i64),
    /// `"random"`.
    Text(String),
}

/// `streamSelector` object of the scenario configuration.
///
/// When several keys are set the precedence is `bandwidth`, `index`, `name`,
/// then `resolution`. An empty object means random.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorConfig {
    /// Exact resolution.
    pub resolution: Option<ResolutionConfig>,
    /// Case-insensitive `NAME`.
    pub name: Option<String>,
    /// `"max"`, `"min"` or an exact number.
    pub bandwidth: Option<BandwidthValue>,
    /// Position or `"random"`.
    pub index: Option<IndexValue>,
}

/// `resolution` object of a selector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ResolutionConfig {
    /// Width in pixels.
    pub width: u64,
    /// Height in pixels.
    pub height: u64,
}

impl From<&SelectorConfig> for SelectionPolicy {
    fn from(config: &SelectorConfig) -> Self {
        if let Some(bandwidth) = &config.bandwidth {
            return Self::Bandwidth(match bandwidth {
                BandwidthValue::Number(value) => BandwidthTarget::Exact(*value),
                BandwidthValue::Text(text) => parse_bandwidth_keyword(text),
            });
        }
        if let Some(index) = &config.index {
            return Self::Index(match index {
                IndexValue::Number(value) => IndexTarget::At(clamp_index(*value)),
                IndexValue::Text(_) => IndexTarget::Random,
            });
        }
        if let Some(name) = &config.name {
            return Self::Name(name.clone());
        }
        if let Some(resolution) = config.resolution {
            return Self::Resolution(Resolution {
                width: resolution.width,
                height: resolution.height,
            });
        }
        Self::Random
    }
}

impl From<&SelectionPolicy> for SelectorConfig {
    fn from(policy: &SelectionPolicy) -> Self {
        match policy {
            SelectionPolicy::Random => Self::default(),
            SelectionPolicy::Index(IndexTarget::Random) => Self {
                index: Some(IndexValue::Text("random".to_string())),
                ..Self::default()
            },
            SelectionPolicy::Index(IndexTarget::At(index)) => Self {
                index: Some(IndexValue::Number(i64::try_from(*index).unwrap_or(i64::MAX))),
                ..Self::default()
            },
            SelectionPolicy::Resolution(resolution) => Self {
                resolution: Some(ResolutionConfig {
                    width: resolution.width,
                    height: resolution.height,
                }),
                ..Self::default()
            },
            SelectionPolicy::Name(name) => Self {
                name: Some(name.clone()),
                ..Self::default()
            },
            SelectionPolicy::Bandwidth(target) => Self {
                bandwidth: Some(match target {
                    BandwidthTarget::Max => BandwidthValue::Text("max".to_string()),
                    BandwidthTarget::Min => BandwidthValue::Text("min".to_string()),
                    BandwidthTarget::Exact(value) => BandwidthValue::Number(*value),
                    BandwidthTarget::Unknown(keyword) => BandwidthValue::Text(keyword.clone()),
                }),
                ..Self::default()
            },
        }
    }
}

fn parse_bandwidth_keyword(text: &str) -> BandwidthTarget {
    match text {
        "max" => BandwidthTarget::Max,
        "min" => BandwidthTarget::Min,
        other => BandwidthTarget::Unknown(other.to_string()),
    }
}

/// Error parsing a `--select` command-line value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorParseError {
    /// The policy name is not known.
    #[error("unknown selector '{0}': expected random, bandwidth=, index=, name= or resolution=")]
    UnknownPolicy(String),

    /// The policy value is malformed.
    #[error("invalid value '{value}' for selector {policy}")]
    InvalidValue {
        /// Policy name.
        policy: &'static str,
        /// Offending value.
        value: String,
    },
}

impl FromStr for SelectionPolicy {
    type Err = SelectorParseError;

    /// Parses `random`, `bandwidth=max|min|N`, `index=N|random`, `name=X` or `resolution=WxH`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("random") {
            return Ok(Self::Random);
        }
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| SelectorParseError::UnknownPolicy(s.to_string()))?;
        let invalid = |policy: &'static str| SelectorParseError::InvalidValue {
            policy,
            value: value.to_string(),
        };

        match key.trim().to_ascii_lowercase().as_str() {
            "bandwidth" => match value {
                "max" => Ok(Self::Bandwidth(BandwidthTarget::Max)),
                "min" => Ok(Self::Bandwidth(BandwidthTarget::Min)),
                number => number
                    .parse()
                    .map(|n| Self::Bandwidth(BandwidthTarget::Exact(n)))
                    .map_err(|_| invalid("bandwidth")),
            },
            "index" => match value {
                "random" => Ok(Self::Index(IndexTarget::Random)),
                number => number
                    .parse::<i64>()
                    .map(|n| Self::Index(IndexTarget::At(clamp_index(n))))
                    .map_err(|_| invalid("index")),
            },
            "name" if !value.is_empty() => Ok(Self::Name(value.to_string())),
            "name" => Err(invalid("name")),
            "resolution" => {
                let (width, height) = value
                    .split_once(['x', 'X'])
                    .ok_or_else(|| invalid("resolution"))?;
                let width = width.parse().map_err(|_| invalid("resolution"))?;
                let height = height.parse().map_err(|_| invalid("resolution"))?;
                Ok(Self::Resolution(Resolution { width, height }))
            }
            _ => Err(SelectorParseError::UnknownPolicy(s.to_string())),
        }
    }
}
