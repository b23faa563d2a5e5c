//! Recursive manifest tree walker.
//!
//! Starting from a root playlist URI, the walker fetches each playlist,
//! relocates its key and segments to local files, rewrites the playlist text
//! to point at them, picks child playlists with a [`StreamSelector`] and
//! descends into them. The result is one flat [`Resource`] list for the
//! download phase.
//!
//! Walking is strictly sequential: a playlist's fetch completes before its
//! children are identified, since selection depends on the parsed parent.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use tracing::{debug, info, instrument};

use super::buffer::ManifestBuffer;
use super::error::WalkError;
use super::key::{KeyContext, KeyMode, handle_key};
use super::layout;
use super::model::{InitializationVector, Key, Manifest, Resource, Segment};
use super::parser::parse_manifest;
use crate::download::HttpClient;
use crate::selector::StreamSelector;
use crate::uri;

/// Walks a playlist tree into a flat resource list.
///
/// # Example
///
/// ```no_run
/// use hls_fetch_core::download::HttpClient;
/// use hls_fetch_core::manifest::{KeyMode, ManifestWalker};
/// use hls_fetch_core::selector::{SelectionPolicy, StreamSelector};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let walker = ManifestWalker::new(HttpClient::new(), StreamSelector::new(SelectionPolicy::Random))
///     .with_base_dir("./out")
///     .with_key_mode(KeyMode::PassThrough);
/// let resources = walker.walk("https://cdn.example.com/vod/master.m3u8").await?;
/// println!("{} resources", resources.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ManifestWalker {
    client: HttpClient,
    base_dir: PathBuf,
    key_mode: KeyMode,
    selector: StreamSelector,
}

/// State shared by every node of one walk.
#[derive(Debug, Default)]
struct WalkState {
    /// Absolute URIs already walked.
    visited: HashSet<String>,
    /// Query string of the root request, propagated to keys and segments.
    root_query: Option<String>,
}

impl ManifestWalker {
    /// Creates a walker rooted at `.` in pass-through key mode.
    #[must_use]
    pub fn new(client: HttpClient, selector: StreamSelector) -> Self {
        Self {
            client,
            base_dir: PathBuf::from("."),
            key_mode: KeyMode::PassThrough,
            selector,
        }
    }

    /// Sets the directory the root playlist is placed in.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Sets how encryption keys are handled.
    #[must_use]
    pub fn with_key_mode(mut self, key_mode: KeyMode) -> Self {
        self.key_mode = key_mode;
        self
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Walks the tree rooted at `root_uri`.
    ///
    /// The list holds, per playlist and depth-first: the playlist itself
    /// (with its rewritten content), its relocated key, its segments, then
    /// the resources of each selected child.
    ///
    /// # Errors
    ///
    /// Returns [`WalkError`] when any playlist in the tree cannot be fetched
    /// or parsed, a reference cannot be resolved, or a key cannot be fetched
    /// in decrypt mode. No partial list is returned.
    #[instrument(skip(self), fields(selector = %self.selector.policy(), key_mode = ?self.key_mode))]
    pub async fn walk(&self, root_uri: &str) -> Result<Vec<Resource>, WalkError> {
        let mut state = WalkState {
            visited: HashSet::new(),
            root_query: uri::query_variables(root_uri),
        };
        let resources = self.walk_node(&mut state, root_uri, None, 0).await?;
        info!(
            resources = resources.len(),
            manifests = state.visited.len(),
            "manifest walk complete"
        );
        Ok(resources)
    }

    fn walk_node<'a>(
        &'a self,
        state: &'a mut WalkState,
        written_uri: &'a str,
        parent: Option<&'a mut Manifest>,
        sibling_index: usize,
    ) -> BoxFuture<'a, Result<Vec<Resource>, WalkError>> {
        Box::pin(async move {
            let absolute = match parent.as_deref() {
                Some(parent) => uri::resolve(&parent.uri, written_uri)?,
                None => written_uri.to_string(),
            };
            if !state.visited.insert(absolute.clone()) {
                debug!(uri = %absolute, "playlist already walked, skipping");
                return Ok(Vec::new());
            }

            let local_file = match parent.as_deref() {
                Some(parent) => {
                    layout::child_manifest_file(&parent.local_file, sibling_index, written_uri)
                }
                None => layout::root_manifest_file(&self.base_dir, written_uri),
            };
            let parent_file = parent.as_deref().map(|p| p.local_file.clone());
            if let Some(parent) = parent {
                let reference = layout::relative_reference(parent.local_dir(), &local_file);
                parent.content.replace_uri(written_uri, &reference);
            }

            let text = self
                .client
                .fetch_text(&absolute)
                .await
                .map_err(|e| WalkError::fetch(&absolute, e))?;
            let parsed =
                parse_manifest(text.as_bytes()).map_err(|m| WalkError::parse(&absolute, m))?;
            let mut manifest = Manifest {
                uri: absolute,
                local_file,
                content: ManifestBuffer::new(text),
            };
            debug!(
                uri = %manifest.uri,
                file = %manifest.local_file.display(),
                segments = parsed.segments.len(),
                playlists = parsed.playlists.len(),
                "walking playlist"
            );

            let candidates = parsed.candidate_playlists();
            let key = handle_key(
                &self.client,
                &mut manifest,
                parsed.first_segment_key(),
                KeyContext {
                    mode: self.key_mode,
                    base_dir: &self.base_dir,
                    parent_file: parent_file.as_deref(),
                    root_query: state.root_query.as_deref(),
                },
            )
            .await?;

            let mut segments = Vec::with_capacity(parsed.segments.len());
            for (index, parsed_segment) in parsed.segments.iter().enumerate() {
                let Some(segment_uri) = parsed_segment.uri.as_deref() else {
                    continue;
                };
                let absolute = uri::resolve(&manifest.uri, segment_uri)?;
                let local_file = layout::segment_file(&manifest.local_file, index, segment_uri);
                let reference = layout::relative_reference(manifest.local_dir(), &local_file);
                manifest.content.replace_uri(segment_uri, &reference);

                let iv = key.as_ref().map(|key| {
                    key.iv.unwrap_or(InitializationVector::Derived {
                        media_sequence: parsed.media_sequence,
                        segment_index: index as u64,
                    })
                });
                segments.push(Segment {
                    uri: match state.root_query.as_deref() {
                        Some(query) => uri::append_query(&absolute, query),
                        None => absolute,
                    },
                    local_file,
                    key: key.clone(),
                    iv,
                });
            }

            let with_uri: Vec<_> = candidates
                .into_iter()
                .filter(|playlist| !playlist.uri.is_empty())
                .collect();
            let selected = self.selector.select(&with_uri).into_streams();

            let mut children = Vec::new();
            for (index, playlist) in selected.iter().enumerate() {
                let resources = self
                    .walk_node(&mut *state, &playlist.uri, Some(&mut manifest), index)
                    .await?;
                children.extend(resources);
            }

            let mut resources = Vec::with_capacity(2 + segments.len() + children.len());
            resources.push(Resource::from(&manifest));
            resources.extend(key.as_ref().and_then(Key::to_resource));
            resources.extend(segments.iter().map(Resource::from));
            resources.extend(children);
            Ok(resources)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::manifest::ResourceKind;
    use crate::selector::{BandwidthTarget, SelectionPolicy};
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MASTER: &str = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n\
        url_0/360.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720\n\
        url_1/720.m3u8\n";

    fn media(prefix: &str) -> String {
        format!(
            "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:0\n\
             #EXTINF:4.0,\n{prefix}_0.ts\n#EXTINF:4.0,\n{prefix}_1.ts\n#EXT-X-ENDLIST\n"
        )
    }

    async fn mount(server: &MockServer, route: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    fn walker(policy: SelectionPolicy) -> ManifestWalker {
        ManifestWalker::new(HttpClient::new(), StreamSelector::new(policy)).with_base_dir("out")
    }

    #[tokio::test]
    async fn test_walk_selects_max_bandwidth_branch() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount(&server, "/vod/master.m3u8", MASTER.to_string()).await;
        mount(&server, "/vod/url_0/360.m3u8", media("low")).await;
        mount(&server, "/vod/url_1/720.m3u8", media("high")).await;

        let resources = walker(SelectionPolicy::Bandwidth(BandwidthTarget::Max))
            .walk(&format!("{}/vod/master.m3u8", server.uri()))
            .await
            .unwrap();

        let kinds: Vec<_> = resources.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Manifest,
                ResourceKind::Manifest,
                ResourceKind::Segment,
                ResourceKind::Segment,
            ]
        );
        let segment_uris: Vec<_> = resources[2..]
            .iter()
            .map(|r| r.uri.clone().unwrap())
            .collect();
        assert_eq!(
            segment_uris,
            vec![
                format!("{}/vod/url_1/high_0.ts", server.uri()),
                format!("{}/vod/url_1/high_1.ts", server.uri()),
            ]
        );

        let master = resources[0].content.as_deref().unwrap();
        assert!(master.contains("\nmanifest0/720.m3u8\n"));
        assert!(master.contains("\nurl_0/360.m3u8\n"));
        assert_eq!(resources[1].local_file, Path::new("out/manifest0/720.m3u8"));
        assert_eq!(resources[2].local_file, Path::new("out/manifest0/high_0.ts"));
    }

    #[tokio::test]
    async fn test_walk_propagates_root_query() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount(&server, "/live/index.m3u8", media("seg")).await;

        let resources = walker(SelectionPolicy::Random)
            .walk(&format!("{}/live/index.m3u8?token=abc", server.uri()))
            .await
            .unwrap();

        assert_eq!(resources.len(), 3);
        assert_eq!(
            resources[1].uri.as_deref(),
            Some(format!("{}/live/seg_0.ts?token=abc", server.uri()).as_str())
        );
        assert_eq!(resources[0].local_file, Path::new("out/index.m3u8"));
    }

    #[tokio::test]
    async fn test_walk_skips_duplicate_playlists() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let master = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=1000,NAME=\"main\"\n\
            a.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=2000,NAME=\"main\"\n\
            a.m3u8\n";
        mount(&server, "/master.m3u8", master.to_string()).await;
        Mock::given(method("GET"))
            .and(path("/a.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(media("a")))
            .expect(1)
            .mount(&server)
            .await;

        let resources = walker(SelectionPolicy::Name("main".to_string()))
            .walk(&format!("{}/master.m3u8", server.uri()))
            .await
            .unwrap();
        let manifests = resources
            .iter()
            .filter(|r| r.kind == ResourceKind::Manifest)
            .count();
        assert_eq!(manifests, 2);
    }

    #[tokio::test]
    async fn test_walk_fails_on_missing_child() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount(&server, "/vod/master.m3u8", MASTER.to_string()).await;
        Mock::given(method("GET"))
            .and(path("/vod/url_1/720.m3u8"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = walker(SelectionPolicy::Bandwidth(BandwidthTarget::Max))
            .walk(&format!("{}/vod/master.m3u8", server.uri()))
            .await;
        assert!(matches!(result, Err(WalkError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_walk_rejects_unparseable_playlist() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        mount(&server, "/bad.m3u8", "<html>not a playlist</html>".to_string()).await;

        let result = walker(SelectionPolicy::Random)
            .walk(&format!("{}/bad.m3u8", server.uri()))
            .await;
        assert!(matches!(result, Err(WalkError::Parse { .. })));
    }
}
