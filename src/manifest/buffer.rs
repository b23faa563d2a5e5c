//! Owned manifest text with in-place URI rewriting.
//!
//! Only URI positions are rewritten: a line that is nothing but the URI
//! (segment and variant references) or the value of a `URI="..."` attribute
//! on a tag line (keys, media groups, maps). Everything else in the playlist
//! is left byte-for-byte intact.

use std::ops::Range;

/// Tag prefix of key lines.
const KEY_TAG: &str = "#EXT-X-KEY";

/// Mutable playlist text owned by one manifest node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestBuffer {
    text: String,
}

impl ManifestBuffer {
    /// Wraps fetched playlist text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Returns the current text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consumes the buffer, returning the text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.text
    }

    /// Returns true if `uri` still appears at a URI position.
    #[must_use]
    pub fn references(&self, uri: &str) -> bool {
        self.find_uri(uri).is_some()
    }

    /// Replaces the first URI-position occurrence of `original` with `replacement`.
    ///
    /// Returns false when `original` does not appear at any URI position.
    pub fn replace_uri(&mut self, original: &str, replacement: &str) -> bool {
        if original.is_empty() {
            return false;
        }
        match self.find_uri(original) {
            Some(range) => {
                self.text.replace_range(range, replacement);
                true
            }
            None => false,
        }
    }

    /// Removes every key tag line whose `URI` attribute is `key_uri`.
    ///
    /// Returns the number of removed lines.
    pub fn remove_key_lines(&mut self, key_uri: &str) -> usize {
        let attribute = uri_attribute(key_uri);
        let mut removed = 0;
        let mut kept = String::with_capacity(self.text.len());
        for line in self.text.split_inclusive('\n') {
            let trimmed = line.trim_start();
            if trimmed.starts_with(KEY_TAG) && attribute_position(line, &attribute).is_some() {
                removed += 1;
            } else {
                kept.push_str(line);
            }
        }
        self.text = kept;
        removed
    }

    fn find_uri(&self, uri: &str) -> Option<Range<usize>> {
        let attribute = uri_attribute(uri);
        let mut offset = 0;
        for line in self.text.split_inclusive('\n') {
            let leading = line.len() - line.trim_start().len();
            let content = line.trim();
            if content.starts_with('#') {
                if let Some(pos) = attribute_position(line, &attribute) {
                    // Skip `URI="` to land on the value itself.
                    let start = offset + pos + 5;
                    return Some(start..start + uri.len());
                }
            } else if content == uri {
                let start = offset + leading;
                return Some(start..start + uri.len());
            }
            offset += line.len();
        }
        None
    }
}

fn uri_attribute(uri: &str) -> String {
    format!("URI=\"{uri}\"")
}

/// Position of `attribute` in a tag line where it starts an attribute.
///
/// The match must follow the tag's `:` or a `,` separator outside a quoted
/// string, so `X-ASSET-URI="..."` is not a URI position.
fn attribute_position(line: &str, attribute: &str) -> Option<usize> {
    let mut quoted = false;
    let mut previous = None;
    for (pos, ch) in line.char_indices() {
        if !quoted
            && matches!(previous, Some(',' | ':'))
            && line[pos..].starts_with(attribute)
        {
            return Some(pos);
        }
        if ch == '"' {
            quoted = !quoted;
        }
        previous = Some(ch);
    }
    None
}
