//! Manifest tree discovery.
//!
//! Fetches a root HLS playlist, follows the child playlists chosen by a
//! [`StreamSelector`](crate::selector::StreamSelector) and produces the flat
//! list of [`Resource`]s to download, with every playlist rewritten to point
//! at local relative paths.

mod buffer;
mod error;
mod key;
pub mod layout;
mod model;
mod parser;
mod walker;

pub use buffer::ManifestBuffer;
pub use error::WalkError;
pub use key::{KeyContext, KeyMode, decode_key_words, handle_key};
pub use model::{
    InitializationVector, Key, KeyMaterial, Manifest, Resolution, Resource, ResourceKind, Segment,
    VariantAttributes, VariantStream,
};
pub use parser::{
    MediaGroupEntry, MediaGroupType, ParsedKey, ParsedManifest, ParsedSegment, parse_manifest,
};
pub use walker::ManifestWalker;
