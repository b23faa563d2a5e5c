//! Playlist tree data model: manifests, segments, keys and the flat resource list.

use std::fmt;
use std::path::{Path, PathBuf};

use super::buffer::ManifestBuffer;

/// Width and height of a variant stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u64,
    /// Height in pixels.
    pub height: u64,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Attributes a selector can match on.
///
/// `NAME` and `PROGRAM-ID` are not standard `EXT-X-STREAM-INF` attributes but
/// are common in the wild, so they are read when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantAttributes {
    /// `NAME` attribute (or the rendition name of a media group entry).
    pub name: Option<String>,
    /// `RESOLUTION` attribute.
    pub resolution: Option<Resolution>,
    /// `CODECS` attribute.
    pub codecs: Option<String>,
    /// `BANDWIDTH` attribute.
    pub bandwidth: Option<u64>,
    /// `PROGRAM-ID` attribute.
    pub program_id: Option<u64>,
}

/// A child playlist candidate, alive only while a selector runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantStream {
    /// Selector-visible attributes.
    pub attributes: VariantAttributes,
    /// URI exactly as written in the parent manifest.
    pub uri: String,
    /// Discontinuity timeline the stream belongs to.
    pub timeline: u64,
}

/// AES-128 initialization vector of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializationVector {
    /// `IV=0x...` attribute from the key tag.
    Explicit([u8; 16]),
    /// Derived from the media sequence when the key tag has no IV.
    Derived {
        /// `EXT-X-MEDIA-SEQUENCE` of the containing manifest.
        media_sequence: u64,
        /// Position of the segment inside the manifest.
        segment_index: u64,
    },
}

impl InitializationVector {
    /// Parses a hex IV attribute (`0x` prefix optional, 32 hex digits).
    #[must_use]
    pub fn from_hex(value: &str) -> Option<Self> {
        let digits = value
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        if digits.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(digits.get(i * 2..i * 2 + 2)?, 16).ok()?;
        }
        Some(Self::Explicit(bytes))
    }

    /// Word form of a derived IV: `[0, 0, 0, media_sequence, segment_index]`.
    ///
    /// Returns `None` for explicit IVs.
    #[must_use]
    pub fn derived_words(&self) -> Option<[u64; 5]> {
        match *self {
            Self::Explicit(_) => None,
            Self::Derived {
                media_sequence,
                segment_index,
            } => Some([0, 0, 0, media_sequence, segment_index]),
        }
    }

    /// The 16-byte IV a decryption step consumes.
    ///
    /// A derived IV is the big-endian 128-bit sequence number of the segment.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 16] {
        match *self {
            Self::Explicit(bytes) => bytes,
            Self::Derived {
                media_sequence,
                segment_index,
            } => u128::from(media_sequence.saturating_add(segment_index)).to_be_bytes(),
        }
    }
}

/// Where the key material of a [`Key`] lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// Pass-through: the key is downloaded later into this local file.
    Relocated {
        /// Local file the key is written to.
        local_file: PathBuf,
    },
    /// Decrypt: the key was fetched during the walk.
    Inline {
        /// Key bytes as four big-endian 32-bit words.
        words: [u32; 4],
    },
}

/// Encryption key of a media playlist, shared by all of its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Absolute network URI (with root query variables appended).
    pub uri: String,
    /// Explicit IV from the key tag, if any.
    pub iv: Option<InitializationVector>,
    /// Relocated file or inline bytes.
    pub material: KeyMaterial,
}

impl Key {
    /// Local file of a relocated key.
    #[must_use]
    pub fn local_file(&self) -> Option<&Path> {
        match &self.material {
            KeyMaterial::Relocated { local_file } => Some(local_file),
            KeyMaterial::Inline { .. } => None,
        }
    }

    /// Decoded key words of an inline key.
    #[must_use]
    pub fn words(&self) -> Option<[u32; 4]> {
        match self.material {
            KeyMaterial::Inline { words } => Some(words),
            KeyMaterial::Relocated { .. } => None,
        }
    }

    /// The download unit for a relocated key; inline keys are not downloaded.
    #[must_use]
    pub fn to_resource(&self) -> Option<Resource> {
        self.local_file().map(|local_file| Resource {
            kind: ResourceKind::Key,
            uri: Some(self.uri.clone()),
            local_file: local_file.to_path_buf(),
            content: None,
            key: None,
            iv: None,
        })
    }
}

/// One media segment of a playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Absolute network URI.
    pub uri: String,
    /// Local file the segment is written to.
    pub local_file: PathBuf,
    /// Key shared by every segment of the manifest, if encrypted.
    pub key: Option<Key>,
    /// Per-segment IV, present whenever `key` is.
    pub iv: Option<InitializationVector>,
}

/// A playlist node of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Absolute network URI.
    pub uri: String,
    /// Local file the rewritten content is written to.
    pub local_file: PathBuf,
    /// Raw content, rewritten in place as references are relocated.
    pub content: ManifestBuffer,
}

impl Manifest {
    /// Directory holding this manifest's local file.
    #[must_use]
    pub fn local_dir(&self) -> &Path {
        self.local_file.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Which kind of tree node a [`Resource`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A playlist.
    Manifest,
    /// An encryption key.
    Key,
    /// A media segment.
    Segment,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Manifest => "manifest",
            Self::Key => "key",
            Self::Segment => "segment",
        };
        f.write_str(label)
    }
}

/// A download unit produced by the walk.
///
/// Manifests carry their already-fetched content; keys and segments carry
/// only a URI until the download phase fetches them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Node kind.
    pub kind: ResourceKind,
    /// Absolute network URI, if the node has one.
    pub uri: Option<String>,
    /// Local file the node is written to.
    pub local_file: PathBuf,
    /// Inline content already resolved during the walk.
    pub content: Option<String>,
    /// Key of an encrypted segment.
    pub key: Option<Key>,
    /// IV of an encrypted segment.
    pub iv: Option<InitializationVector>,
}

impl Resource {
    /// True when the download phase must fetch this resource.
    #[must_use]
    pub fn needs_fetch(&self) -> bool {
        self.uri.is_some() && self.content.is_none()
    }
}

impl From<&Manifest> for Resource {
    fn from(manifest: &Manifest) -> Self {
        Self {
            kind: ResourceKind::Manifest,
            uri: Some(manifest.uri.clone()),
            local_file: manifest.local_file.clone(),
            content: Some(manifest.content.as_str().to_string()),
            key: None,
            iv: None,
        }
    }
}

impl From<&Segment> for Resource {
    fn from(segment: &Segment) -> Self {
        Self {
            kind: ResourceKind::Segment,
            uri: Some(segment.uri.clone()),
            local_file: segment.local_file.clone(),
            content: None,
            key: segment.key.clone(),
            iv: segment.iv,
        }
    }
}
