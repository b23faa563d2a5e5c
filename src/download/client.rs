//! HTTP client wrapper for manifests, keys and media segments.
//!
//! Manifests and keys are small and fetched whole; segments are streamed
//! chunk by chunk into a file (or drained when no output directory is set),
//! optionally paced by a per-response [`Throttle`].
//!
//! The request timeout bounds the wait for response headers and for each
//! body chunk, not the whole transfer, so a paced body may take longer.

use std::path::Path;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};
use super::error::DownloadError;
use super::throttle::Throttle;
use crate::user_agent;

/// HTTP client shared by the walker and the download pool.
///
/// Cheap to clone; clones share one connection pool.
///
/// # Example
///
/// ```no_run
/// use hls_fetch_core::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let playlist = client.fetch_text("https://cdn.example.com/vod/master.m3u8").await?;
/// println!("{playlist}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    read_timeout: Duration,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 10 seconds
    /// - Header and per-chunk timeout: 60 seconds
    /// - Gzip decompression: enabled
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    #[must_use]
    pub fn new_with_timeouts(connect_timeout_secs: u64, request_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .unwrap_or_else(|error| {
                warn!(%error, "HTTP client builder failed; using library defaults");
                Client::new()
            });
        Self {
            client,
            read_timeout: Duration::from_secs(request_timeout_secs),
        }
    }

    /// Fetches a whole response body as text.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the URL is invalid, the request fails or
    /// times out, or the server answers with a non-2xx status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.send(url).await?;
        let text = tokio::time::timeout(self.read_timeout, response.text())
            .await
            .map_err(|_| DownloadError::timeout(url))?
            .map_err(|e| DownloadError::network(url, e))?;
        debug!(bytes = text.len(), "fetched text");
        Ok(text)
    }

    /// Fetches a whole response body as bytes.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`fetch_text`](Self::fetch_text).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.send(url).await?;
        let bytes = tokio::time::timeout(self.read_timeout, response.bytes())
            .await
            .map_err(|_| DownloadError::timeout(url))?
            .map_err(|e| DownloadError::network(url, e))?;
        debug!(bytes = bytes.len(), "fetched bytes");
        Ok(bytes.to_vec())
    }

    /// Streams a response body into `destination`, or drains it when `None`.
    ///
    /// Parent directories of `destination` are created. A partially written
    /// file is removed when the stream fails.
    ///
    /// Returns the number of body bytes received.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`fetch_text`](Self::fetch_text), plus
    /// `DownloadError::Io` when the file cannot be written.
    #[instrument(skip(self, throttle), fields(url = %url))]
    pub async fn fetch_to_sink(
        &self,
        url: &str,
        destination: Option<&Path>,
        throttle: Option<Throttle>,
    ) -> Result<u64, DownloadError> {
        let response = self.send(url).await?;

        let Some(path) = destination else {
            return drain(response, url, throttle, self.read_timeout).await;
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }
        let mut file = File::create(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        let result =
            stream_to_file(&mut file, response, url, path, throttle, self.read_timeout).await;
        if result.is_err() {
            debug!(path = %path.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(path).await;
        }
        result
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = tokio::time::timeout(self.read_timeout, self.client.get(url).send())
            .await
            .map_err(|_| DownloadError::timeout(url))?
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Waits for the next body chunk; the timeout restarts for every chunk.
async fn next_chunk<S, B>(
    stream: &mut S,
    url: &str,
    read_timeout: Duration,
) -> Result<Option<B>, DownloadError>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
{
    match tokio::time::timeout(read_timeout, stream.next()).await {
        Ok(Some(chunk)) => chunk.map(Some).map_err(|e| DownloadError::network(url, e)),
        Ok(None) => Ok(None),
        Err(_) => Err(DownloadError::timeout(url)),
    }
}

async fn drain(
    response: reqwest::Response,
    url: &str,
    throttle: Option<Throttle>,
    read_timeout: Duration,
) -> Result<u64, DownloadError> {
    let mut pacer = throttle.map(|t| t.pacer());
    let mut stream = response.bytes_stream();
    let mut received: u64 = 0;

    while let Some(chunk) = next_chunk(&mut stream, url, read_timeout).await? {
        received += chunk.len() as u64;
        if let Some(pacer) = pacer.as_mut() {
            pacer.consume(chunk.len()).await;
        }
    }

    Ok(received)
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    throttle: Option<Throttle>,
    read_timeout: Duration,
) -> Result<u64, DownloadError> {
    let mut pacer = throttle.map(|t| t.pacer());
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = next_chunk(&mut stream, url, read_timeout).await? {
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
        if let Some(pacer) = pacer.as_mut() {
            pacer.consume(chunk.len()).await;
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
