//! Local file layout of a walked tree.
//!
//! ```text
//! <base>/master.m3u8
//! <base>/k.key                      key of a child, next to its parent
//! <base>/manifest0/720.m3u8         child playlists, one directory per sibling
//! <base>/manifest0/seg0.ts          segments beside their playlist
//! <base>/manifest0/manifest0/...    nested children
//! ```

use std::path::{Component, Path, PathBuf};

use crate::uri;

const MANIFEST_FALLBACK: &str = "manifest.m3u8";
const KEY_FALLBACK: &str = "key.key";

/// Local file of the root playlist.
#[must_use]
pub fn root_manifest_file(base_dir: &Path, uri: &str) -> PathBuf {
    base_dir.join(uri::file_name(uri, MANIFEST_FALLBACK))
}

/// Local file of the `index`-th selected child of the playlist stored at `parent_file`.
#[must_use]
pub fn child_manifest_file(parent_file: &Path, index: usize, uri: &str) -> PathBuf {
    parent_dir(parent_file)
        .join(format!("manifest{index}"))
        .join(uri::file_name(uri, MANIFEST_FALLBACK))
}

/// Local file of the `index`-th segment of the playlist stored at `manifest_file`.
#[must_use]
pub fn segment_file(manifest_file: &Path, index: usize, uri: &str) -> PathBuf {
    parent_dir(manifest_file).join(uri::file_name(uri, &format!("segment{index}.ts")))
}

/// Local file of a relocated key: the parent playlist's directory, or `base_dir` for the root.
#[must_use]
pub fn key_file(base_dir: &Path, parent_file: Option<&Path>, uri: &str) -> PathBuf {
    let dir = parent_file.map_or_else(|| base_dir.to_path_buf(), |p| parent_dir(p).to_path_buf());
    dir.join(uri::file_name(uri, KEY_FALLBACK))
}

/// Relative reference from directory `from_dir` to `to_file`, `/`-separated.
///
/// Both paths must share the same root (both under the walk's base directory).
#[must_use]
pub fn relative_reference(from_dir: &Path, to_file: &Path) -> String {
    let from: Vec<Component<'_>> = normal_components(from_dir);
    let to: Vec<Component<'_>> = normal_components(to_file);
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    parts.extend(std::iter::repeat_n("..".to_string(), from.len() - common));
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

fn parent_dir(file: &Path) -> &Path {
    file.parent().unwrap_or_else(|| Path::new(""))
}

fn normal_components(path: &Path) -> Vec<Component<'_>> {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
