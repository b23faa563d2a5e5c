//! URI classification and joining for playlist references.
//!
//! Playlists reference children, keys and segments either absolutely
//! (`https://cdn.example.com/seg0.ts`) or relative to the playlist that
//! contains them (`url_0/seg0.ts`). Everything in this module is a pure
//! function over strings.
//!
//! # Example
//!
//! ```
//! use hls_fetch_core::uri::{is_absolute, resolve};
//!
//! let base = "https://cdn.example.com/vod/master.m3u8?token=abc";
//! let child = resolve(base, "720/index.m3u8").unwrap();
//! assert_eq!(child, "https://cdn.example.com/vod/720/index.m3u8?token=abc");
//! assert!(is_absolute(&child));
//! assert_eq!(resolve(base, &child).unwrap(), child);
//! ```

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors produced while resolving a URI against its base.
#[derive(Debug, Error)]
pub enum UriError {
    /// The base URI could not be parsed as an absolute URL.
    #[error("invalid base URI {base}: {source}")]
    InvalidBase {
        /// The base that failed to parse.
        base: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The relative reference could not be joined onto the base.
    #[error("cannot join {relative} onto {base}: {source}")]
    Join {
        /// The base URI.
        base: String,
        /// The relative reference.
        relative: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
}

/// Returns true iff `uri` carries a scheme.
#[must_use]
pub fn is_absolute(uri: &str) -> bool {
    Url::parse(uri).is_ok()
}

/// Joins `relative` onto the path of `base`.
///
/// Scheme and host come from `base`. When `relative` carries no query of its
/// own, the query of `base` is kept so signed-URL tokens survive the join.
/// Absolute input is returned unchanged, which makes the function idempotent:
/// `resolve(b, &resolve(b, u)?)? == resolve(b, u)?`.
///
/// # Errors
///
/// Returns [`UriError`] if `base` is not an absolute URL or the join fails.
pub fn resolve(base: &str, relative: &str) -> Result<String, UriError> {
    if is_absolute(relative) {
        return Ok(relative.to_string());
    }

    let base_url = Url::parse(base).map_err(|source| UriError::InvalidBase {
        base: base.to_string(),
        source,
    })?;
    let mut joined = base_url.join(relative).map_err(|source| UriError::Join {
        base: base.to_string(),
        relative: relative.to_string(),
        source,
    })?;
    if joined.query().is_none() {
        joined.set_query(base_url.query());
    }

    Ok(joined.into())
}

/// Returns the query string of `uri` (without the leading `?`), if non-empty.
#[must_use]
pub fn query_variables(uri: &str) -> Option<String> {
    Url::parse(uri)
        .ok()
        .and_then(|url| url.query().map(str::to_string))
        .filter(|query| !query.is_empty())
}

/// Appends the pairs in `variables` to `uri`, skipping keys `uri` already has.
///
/// `variables` is a raw query string such as `token=abc&session=1`.
#[must_use]
pub fn append_query(uri: &str, variables: &str) -> String {
    let variables = variables.trim_start_matches('?');
    if variables.is_empty() {
        return uri.to_string();
    }

    let Ok(mut url) = Url::parse(uri) else {
        debug!(uri, "cannot parse URI for query merge, appending raw");
        let separator = if uri.contains('?') { '&' } else { '?' };
        return format!("{uri}{separator}{variables}");
    };

    let existing: HashSet<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
    let additions: Vec<(String, String)> = url::form_urlencoded::parse(variables.as_bytes())
        .filter(|(k, _)| !existing.contains(k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if additions.is_empty() {
        return url.into();
    }

    url.query_pairs_mut().extend_pairs(additions);
    url.into()
}

/// Returns the decoded last path segment of `uri`, or `fallback` if it has none.
///
/// Works for absolute and relative references; query and fragment are ignored.
#[must_use]
pub fn file_name(uri: &str, fallback: &str) -> String {
    let path = match Url::parse(uri) {
        Ok(url) => url.path().to_string(),
        Err(_) => uri
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let last = path.rsplit('/').next().unwrap_or_default();
    if last.is_empty() || last == "." || last == ".." {
        return fallback.to_string();
    }

    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    // Decoded names must stay a single path component.
    let sanitized = decoded.replace(['/', '\\'], "_");
    if sanitized.is_empty() {
        fallback.to_string()
    } else {
        sanitized
    }
}
