//! Adapter from `m3u8-rs` playlists to the walker's view of a manifest.

use m3u8_rs::{AlternativeMedia, AlternativeMediaType, KeyMethod, Playlist, QuotedOrUnquoted};
use tracing::trace;

use super::model::{InitializationVector, Resolution, VariantAttributes, VariantStream};

/// Media group types whose renditions are child playlist candidates, in flattening order.
const MEDIA_GROUP_ORDER: [MediaGroupType; 4] = [
    MediaGroupType::Audio,
    MediaGroupType::Video,
    MediaGroupType::ClosedCaptions,
    MediaGroupType::Subtitles,
];

/// `TYPE` of an `EXT-X-MEDIA` rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaGroupType {
    /// `AUDIO`
    Audio,
    /// `VIDEO`
    Video,
    /// `CLOSED-CAPTIONS`
    ClosedCaptions,
    /// `SUBTITLES`
    Subtitles,
}

/// A rendition of a media group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaGroupEntry {
    /// Group type.
    pub media_type: MediaGroupType,
    /// `GROUP-ID`.
    pub group_id: String,
    /// The rendition as a selectable stream.
    pub stream: VariantStream,
}

/// Key descriptor found on a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    /// URI as written in the playlist.
    pub uri: String,
    /// Explicit IV, if the tag carries one.
    pub iv: Option<InitializationVector>,
}

/// A segment as written in the playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSegment {
    /// URI as written in the playlist, if any.
    pub uri: Option<String>,
    /// Key tag that applies from this segment on.
    pub key: Option<ParsedKey>,
}

/// Structured view of one playlist document.
///
/// Master playlists yield `playlists` and `media_groups`; media playlists
/// yield `segments`. The other collections are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedManifest {
    /// `EXT-X-MEDIA-SEQUENCE` (0 when absent).
    pub media_sequence: u64,
    /// Media segments.
    pub segments: Vec<ParsedSegment>,
    /// Variant streams referenced by `EXT-X-STREAM-INF`.
    pub playlists: Vec<VariantStream>,
    /// Renditions referenced by `EXT-X-MEDIA`.
    pub media_groups: Vec<MediaGroupEntry>,
}

impl ParsedManifest {
    /// Media group renditions flattened in `AUDIO`, `VIDEO`,
    /// `CLOSED-CAPTIONS`, `SUBTITLES` order.
    #[must_use]
    pub fn media_group_playlists(&self) -> Vec<VariantStream> {
        MEDIA_GROUP_ORDER
            .iter()
            .flat_map(|media_type| {
                self.media_groups
                    .iter()
                    .filter(move |entry| entry.media_type == *media_type)
                    .map(|entry| entry.stream.clone())
            })
            .collect()
    }

    /// Union of direct playlists and every media group rendition.
    #[must_use]
    pub fn candidate_playlists(&self) -> Vec<VariantStream> {
        let mut candidates = self.playlists.clone();
        candidates.extend(self.media_group_playlists());
        candidates
    }

    /// Key descriptor of the first segment, if it is encrypted.
    #[must_use]
    pub fn first_segment_key(&self) -> Option<&ParsedKey> {
        self.segments.first().and_then(|segment| segment.key.as_ref())
    }
}

/// Parses playlist text.
///
/// # Errors
///
/// Returns the parser's message when the document is not a playlist.
pub fn parse_manifest(content: &[u8]) -> Result<ParsedManifest, String> {
    let playlist = m3u8_rs::parse_playlist_res(content).map_err(|e| e.to_string())?;
    let parsed = match playlist {
        Playlist::MasterPlaylist(master) => ParsedManifest {
            media_sequence: 0,
            segments: Vec::new(),
            playlists: master
                .variants
                .iter()
                .filter(|variant| !variant.is_i_frame)
                .map(|variant| VariantStream {
                    attributes: VariantAttributes {
                        name: other_attribute(variant.other_attributes.as_ref(), "NAME"),
                        resolution: variant.resolution.map(|r| Resolution {
                            width: r.width,
                            height: r.height,
                        }),
                        codecs: variant.codecs.clone(),
                        bandwidth: Some(variant.bandwidth),
                        program_id: other_attribute(
                            variant.other_attributes.as_ref(),
                            "PROGRAM-ID",
                        )
                        .and_then(|id| id.parse().ok()),
                    },
                    uri: variant.uri.clone(),
                    timeline: 0,
                })
                .collect(),
            media_groups: master
                .alternatives
                .iter()
                .filter_map(media_group_entry)
                .collect(),
        },
        Playlist::MediaPlaylist(media) => ParsedManifest {
            media_sequence: media.media_sequence,
            segments: media
                .segments
                .iter()
                .map(|segment| ParsedSegment {
                    uri: Some(segment.uri.clone()).filter(|uri| !uri.is_empty()),
                    key: segment.key.as_ref().and_then(|key| {
                        if key.method == KeyMethod::None {
                            return None;
                        }
                        let uri = key.uri.clone().filter(|uri| !uri.is_empty())?;
                        Some(ParsedKey {
                            uri,
                            iv: key.iv.as_deref().and_then(InitializationVector::from_hex),
                        })
                    }),
                })
                .collect(),
            playlists: Vec::new(),
            media_groups: Vec::new(),
        },
    };

    trace!(
        segments = parsed.segments.len(),
        playlists = parsed.playlists.len(),
        media_groups = parsed.media_groups.len(),
        "parsed manifest"
    );
    Ok(parsed)
}

fn media_group_entry(alternative: &AlternativeMedia) -> Option<MediaGroupEntry> {
    let media_type = match alternative.media_type {
        AlternativeMediaType::Audio => MediaGroupType::Audio,
        AlternativeMediaType::Video => MediaGroupType::Video,
        AlternativeMediaType::ClosedCaptions => MediaGroupType::ClosedCaptions,
        AlternativeMediaType::Subtitles => MediaGroupType::Subtitles,
        _ => return None,
    };
    Some(MediaGroupEntry {
        media_type,
        group_id: alternative.group_id.clone(),
        stream: VariantStream {
            attributes: VariantAttributes {
                name: Some(alternative.name.clone()),
                ..VariantAttributes::default()
            },
            uri: alternative.uri.clone().unwrap_or_default(),
            timeline: 0,
        },
    })
}

fn other_attribute(
    attributes: Option<&std::collections::HashMap<String, QuotedOrUnquoted>>,
    name: &str,
) -> Option<String> {
    attributes
        .and_then(|map| map.get(name))
        .map(|value| match value {
            QuotedOrUnquoted::Quoted(s) | QuotedOrUnquoted::Unquoted(s) => s.clone(),
        })
}
