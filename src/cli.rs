//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;

use hls_fetch_core::HlsConfig;
use hls_fetch_core::selector::{SelectionPolicy, SelectorConfig};

/// Walk an HLS manifest tree and fetch one rendition.
///
/// Resolves the playlist tree rooted at URL, picks child playlists with the
/// selector, then downloads every key and segment through a bounded pool.
/// Without --output-dir the bodies are drained and discarded.
#[derive(Parser, Debug)]
#[command(name = "hls-fetch")]
#[command(author, version, about)]
pub struct Args {
    /// Root playlist URL
    pub url: String,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum concurrent downloads (1-100) [default: 4]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Per-response bandwidth cap in bytes per second (unbounded if omitted)
    #[arg(short = 't', long)]
    pub throttle: Option<u64>,

    /// Child playlist selector: random, bandwidth=max|min|N, index=N|random, name=X, resolution=WxH
    #[arg(short = 's', long = "select")]
    pub select: Option<SelectionPolicy>,

    /// Fetch keys during the walk and strip key tags from playlists
    #[arg(long)]
    pub decrypt: bool,

    /// Write the rewritten tree under this directory
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// JSON file holding an `hls` configuration object; flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Builds the effective configuration from `--config` and the flags.
    pub fn hls_config(&self) -> Result<HlsConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid hls configuration in {}", path.display()))?
            }
            None => HlsConfig::default(),
        };

        if let Some(concurrency) = self.concurrency {
            config.concurrency = Some(Value::from(concurrency));
        }
        if let Some(throttle) = self.throttle {
            config.throttle = Some(Value::from(throttle));
        }
        if let Some(policy) = &self.select {
            config.stream_selector = Some(SelectorConfig::from(policy));
        }
        if self.decrypt {
            config.decrypt = true;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = Some(dir.clone());
        }
        Ok(config)
    }
}
