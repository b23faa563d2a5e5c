//! Error types for manifest tree resolution.

use thiserror::Error;

use crate::download::DownloadError;
use crate::uri::UriError;

/// Errors that abort a manifest walk.
#[derive(Debug, Error)]
pub enum WalkError {
    /// The manifest could not be fetched.
    #[error("failed to fetch manifest {uri}: {source}")]
    Fetch {
        /// Absolute manifest URI.
        uri: String,
        /// The underlying download error.
        #[source]
        source: DownloadError,
    },

    /// The fetched document is not a playlist.
    #[error("failed to parse manifest {uri}: {message}")]
    Parse {
        /// Absolute manifest URI.
        uri: String,
        /// Parser message.
        message: String,
    },

    /// A reference inside the manifest could not be resolved.
    #[error("invalid reference in manifest: {source}")]
    InvalidUri {
        /// The underlying resolution error.
        #[source]
        source: UriError,
    },

    /// The key could not be fetched in decrypt mode.
    #[error("failed to fetch key {uri}: {source}")]
    KeyFetch {
        /// Absolute key URI.
        uri: String,
        /// The underlying download error.
        #[source]
        source: DownloadError,
    },

    /// The key body is too short to hold an AES-128 key.
    #[error("key {uri} is {len} bytes, expected at least 16")]
    KeyTooShort {
        /// Absolute key URI.
        uri: String,
        /// Body length in bytes.
        len: usize,
    },
}

impl WalkError {
    /// Creates a manifest fetch error.
    pub fn fetch(uri: impl Into<String>, source: DownloadError) -> Self {
        Self::Fetch {
            uri: uri.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Creates a key fetch error.
    pub fn key_fetch(uri: impl Into<String>, source: DownloadError) -> Self {
        Self::KeyFetch {
            uri: uri.into(),
            source,
        }
    }

    /// Creates a short key error.
    pub fn key_too_short(uri: impl Into<String>, len: usize) -> Self {
        Self::KeyTooShort {
            uri: uri.into(),
            len,
        }
    }
}

impl From<UriError> for WalkError {
    fn from(source: UriError) -> Self {
        Self::InvalidUri { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_error_parse_display() {
        let error = WalkError::parse("https://h/m.m3u8", "missing #EXTM3U");
        let msg = error.to_string();
        assert!(msg.contains("https://h/m.m3u8"), "Expected URI in: {msg}");
        assert!(msg.contains("missing #EXTM3U"), "Expected message in: {msg}");
    }

    #[test]
    fn test_walk_error_key_fetch_display() {
        let error = WalkError::key_fetch(
            "https://h/k.key",
            DownloadError::http_status("https://h/k.key", 403),
        );
        let msg = error.to_string();
        assert!(msg.contains("key"), "Expected 'key' in: {msg}");
        assert!(msg.contains("403"), "Expected status in: {msg}");
    }

    #[test]
    fn test_walk_error_key_too_short_display() {
        let msg = WalkError::key_too_short("https://h/k.key", 3).to_string();
        assert!(msg.contains("3 bytes"), "Expected length in: {msg}");
    }
}
