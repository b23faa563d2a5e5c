//! Encryption key extraction for media playlists.
//!
//! The key of the first segment applies to the whole playlist. In
//! pass-through mode it is relocated next to the parent playlist and
//! downloaded later with the segments; in decrypt mode its bytes are fetched
//! immediately and the key tag is stripped from the playlist.

use std::path::Path;

use tracing::{debug, instrument};

use super::error::WalkError;
use super::layout;
use super::model::{Key, KeyMaterial, Manifest};
use super::parser::ParsedKey;
use crate::download::HttpClient;
use crate::uri;

/// Length of an AES-128 key in bytes.
const AES_128_KEY_LEN: usize = 16;

/// How a walk treats encryption keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// Relocate the key and download it with the segments.
    #[default]
    PassThrough,
    /// Fetch the key bytes now and strip the key tag.
    Decrypt,
}

impl From<bool> for KeyMode {
    fn from(decrypt: bool) -> Self {
        if decrypt { Self::Decrypt } else { Self::PassThrough }
    }
}

/// Walk-wide inputs of the key handler.
#[derive(Debug, Clone, Copy)]
pub struct KeyContext<'a> {
    /// Pass-through or decrypt.
    pub mode: KeyMode,
    /// Base directory of the walk.
    pub base_dir: &'a Path,
    /// Local file of the parent playlist, `None` for the root.
    pub parent_file: Option<&'a Path>,
    /// Query string of the root request.
    pub root_query: Option<&'a str>,
}

/// Resolves the playlist's key, rewriting `manifest` as the mode requires.
///
/// Returns `Ok(None)` when the first segment carries no key.
///
/// # Errors
///
/// Returns [`WalkError::InvalidUri`] if the key URI cannot be resolved, and
/// in decrypt mode [`WalkError::KeyFetch`] or [`WalkError::KeyTooShort`].
#[instrument(skip_all, fields(manifest = %manifest.uri))]
pub async fn handle_key(
    client: &HttpClient,
    manifest: &mut Manifest,
    descriptor: Option<&ParsedKey>,
    context: KeyContext<'_>,
) -> Result<Option<Key>, WalkError> {
    let Some(descriptor) = descriptor else {
        return Ok(None);
    };

    let absolute = uri::resolve(&manifest.uri, &descriptor.uri)?;
    let network_uri = match context.root_query {
        Some(query) => uri::append_query(&absolute, query),
        None => absolute,
    };

    let material = match context.mode {
        KeyMode::PassThrough => relocate(manifest, descriptor, context),
        KeyMode::Decrypt => {
            let words = fetch_words(client, &network_uri).await?;
            let removed = manifest.content.remove_key_lines(&descriptor.uri);
            debug!(removed, "stripped key tags");
            KeyMaterial::Inline { words }
        }
    };

    Ok(Some(Key {
        uri: network_uri,
        iv: descriptor.iv,
        material,
    }))
}

/// Points the playlist at the key's local file.
///
/// Running it again on an already rewritten playlist is a no-op.
fn relocate(
    manifest: &mut Manifest,
    descriptor: &ParsedKey,
    context: KeyContext<'_>,
) -> KeyMaterial {
    let local_file = layout::key_file(context.base_dir, context.parent_file, &descriptor.uri);
    let reference = layout::relative_reference(manifest.local_dir(), &local_file);
    if manifest.content.replace_uri(&descriptor.uri, &reference) {
        debug!(key = %descriptor.uri, %reference, "relocated key");
    }
    KeyMaterial::Relocated { local_file }
}

async fn fetch_words(client: &HttpClient, uri: &str) -> Result<[u32; 4], WalkError> {
    let body = client
        .fetch_bytes(uri)
        .await
        .map_err(|e| WalkError::key_fetch(uri, e))?;
    decode_key_words(&body).ok_or_else(|| WalkError::key_too_short(uri, body.len()))
}

/// Decodes the first 16 bytes of `body` into four big-endian words.
#[must_use]
pub fn decode_key_words(body: &[u8]) -> Option<[u32; 4]> {
    if body.len() < AES_128_KEY_LEN {
        return None;
    }
    let mut words = [0u32; 4];
    for (word, chunk) in words.iter_mut().zip(body.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Some(words)
}
