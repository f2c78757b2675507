//! End-to-end resolution: identifier → embed page → stream list.
//!
//! One run picks exactly one branch. If the embed page declares servers and
//! at least one handshake succeeds, those results are returned; otherwise
//! the heuristic chain scans the page text. The two are never merged, so a
//! server never shows up twice under different names.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::ResolverConfig;
use crate::context::RunContext;
use crate::document::EmbedDocument;
use crate::error::Result;
use crate::extract::{Candidate, HeuristicChain};
use crate::handshake::resolve_servers;
use crate::hls::{fetch_and_parse, is_playlist_url, HlsManifest};
use crate::http_client::{Fetcher, HttpFetcher};
use crate::identifier::{MediaIdentifier, MediaKind};

/// One playable source found for a media item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedStream {
    pub display_name: String,
    pub poster_image: Option<String>,
    pub media_id: String,
    pub stream_url: String,
    /// Origin to send as `Referer` when playing the stream.
    pub referer_origin: String,
    /// Present when `stream_url` is a master playlist with at least one variant.
    pub hls_data: Option<HlsManifest>,
}

/// Flat listing entry handed to the caller's stream protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamRecord {
    pub display_title: String,
    pub url: String,
    pub is_adaptive: bool,
    pub referer_origin: String,
}

impl ResolvedStream {
    /// Listing entries: master ("Auto Quality") plus one per variant when
    /// HLS data is present, otherwise the raw URL alone.
    pub fn records(&self) -> Vec<StreamRecord> {
        let record = |display_title: String, url: &str, is_adaptive: bool| StreamRecord {
            display_title,
            url: url.to_string(),
            is_adaptive,
            referer_origin: self.referer_origin.clone(),
        };

        match &self.hls_data {
            Some(hls) if !hls.qualities.is_empty() => {
                let mut records = Vec::with_capacity(hls.qualities.len() + 1);
                records.push(record(
                    format!("{} - Auto Quality", self.display_name),
                    &self.stream_url,
                    true,
                ));
                records.extend(hls.qualities.iter().map(|q| {
                    record(format!("{} - {}", self.display_name, q.title), &q.url, true)
                }));
                records
            }
            _ => vec![record(
                self.display_name.clone(),
                &self.stream_url,
                is_playlist_url(&self.stream_url),
            )],
        }
    }
}

/// Flatten streams into listing entries, preserving order.
pub fn records(streams: &[ResolvedStream]) -> Vec<StreamRecord> {
    streams.iter().flat_map(ResolvedStream::records).collect()
}

/// Resolution pipeline bound to one transport and configuration.
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    config: ResolverConfig,
    chain: HeuristicChain,
}

impl Resolver {
    /// Create a resolver using the reqwest transport.
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let fetcher = HttpFetcher::with_config(&config)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Create a resolver over any [`Fetcher`].
    pub fn with_fetcher(config: ResolverConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            config,
            chain: HeuristicChain::new(),
        }
    }

    /// Replace the heuristic strategy list.
    #[must_use]
    pub fn with_chain(mut self, chain: HeuristicChain) -> Self {
        self.chain = chain;
        self
    }

    /// Resolve `id` of the given kind to an ordered stream list.
    ///
    /// # Errors
    ///
    /// Only malformed identifiers are errors. Upstream failures of any kind
    /// yield an empty or partial list.
    #[instrument(skip(self), fields(id = %id, kind = %kind))]
    pub async fn resolve(&self, id: &str, kind: MediaKind) -> Result<Vec<ResolvedStream>> {
        let identifier = MediaIdentifier::parse(id, kind)?;
        Ok(self.resolve_identifier(&identifier).await)
    }

    /// Resolve an already validated identifier.
    pub async fn resolve_identifier(&self, identifier: &MediaIdentifier) -> Vec<ResolvedStream> {
        let mut ctx = RunContext::new(&self.config.default_origin, identifier.external_id());
        let embed_url = identifier.embed_url(&self.config.embed_base);

        let Some(page) = self.fetch_page(&ctx, &embed_url).await else {
            return Vec::new();
        };

        let doc = EmbedDocument::load(&page, ctx.origin());
        ctx.adopt_origin_of(&doc.origin);
        ctx.title.clone_from(&doc.title);
        ctx.poster.clone_from(&doc.poster);
        debug!(
            origin = ctx.origin(),
            title = %ctx.title,
            servers = doc.servers.len(),
            "Embed page loaded"
        );

        let streams = if doc.servers.is_empty() {
            self.resolve_heuristic(&doc, &mut ctx).await
        } else {
            let structured = self.resolve_structured(&doc, &ctx).await;
            if structured.is_empty() {
                debug!("No server handshake succeeded, falling back to page scanning");
                self.resolve_heuristic(&doc, &mut ctx).await
            } else {
                structured
            }
        };

        info!(%identifier, streams = streams.len(), "Resolution finished");
        streams
    }

    async fn resolve_structured(&self, doc: &EmbedDocument, ctx: &RunContext) -> Vec<ResolvedStream> {
        let outcomes = resolve_servers(self.fetcher.as_ref(), ctx, &doc.servers).await;

        let expansions = outcomes.into_iter().map(|outcome| {
            let name = join_title(&ctx.title, &outcome.server.display_name);
            self.expand(ctx, outcome.media_url, name)
        });
        join_all(expansions).await
    }

    async fn resolve_heuristic(
        &self,
        doc: &EmbedDocument,
        ctx: &mut RunContext,
    ) -> Vec<ResolvedStream> {
        let candidates = self.chain.run(&doc.raw, ctx, self.fetcher.as_ref()).await;

        let ctx: &RunContext = ctx;
        let expansions = candidates.into_iter().map(|Candidate { url, tag }| {
            let label = match tag {
                Some(tag) => format!("{} ({tag})", self.config.provider_label),
                None => self.config.provider_label.clone(),
            };
            self.expand(ctx, url, join_title(&ctx.title, &label))
        });
        join_all(expansions).await
    }

    /// Build a stream for `url`, attaching HLS variants when it is a master playlist.
    async fn expand(&self, ctx: &RunContext, url: String, display_name: String) -> ResolvedStream {
        let hls_data = if is_playlist_url(&url) {
            match ctx.headers() {
                Ok(headers) => fetch_and_parse(self.fetcher.as_ref(), &url, headers)
                    .await
                    .filter(|m| !m.qualities.is_empty()),
                Err(e) => {
                    debug!("Skipping HLS expansion: {e}");
                    None
                }
            }
        } else {
            None
        };

        ResolvedStream {
            display_name,
            poster_image: ctx.poster.clone(),
            media_id: ctx.media_id.clone(),
            stream_url: url,
            referer_origin: ctx.origin().to_string(),
            hls_data,
        }
    }

    async fn fetch_page(&self, ctx: &RunContext, url: &str) -> Option<String> {
        let headers = ctx.headers().ok()?;
        match self.fetcher.get(url, headers).await {
            Ok(resp) if resp.is_success() => Some(resp.body),
            Ok(resp) => {
                warn!(url, status = resp.status, "Embed page unavailable");
                None
            }
            Err(e) => {
                warn!(url, "Embed page fetch failed: {e}");
                None
            }
        }
    }
}

fn join_title(title: &str, label: &str) -> String {
    if title.is_empty() {
        label.to_string()
    } else {
        format!("{title} - {label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::extract::MediaFileFallback;
    use crate::http_client::testing::StubFetcher;

    const EMBED: &str = "https://vidsrc.test/embed";
    const ORIGIN: &str = "https://cloudnestra.test";

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1500000,RESOLUTION=1280x720
720.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=6000000,RESOLUTION=1920x1080
1080.m3u8
";

    fn config() -> ResolverConfig {
        ResolverConfig {
            embed_base: EMBED.to_string(),
            default_origin: ORIGIN.to_string(),
            ..ResolverConfig::default()
        }
    }

    fn resolver(stub: &Arc<StubFetcher>) -> Resolver {
        let fetcher: Arc<dyn Fetcher> = stub.clone();
        Resolver::with_fetcher(config(), fetcher)
    }

    fn servers_page(hashes: &[&str]) -> String {
        let items: String = hashes
            .iter()
            .enumerate()
            .map(|(i, h)| format!(r#"<div class="server" data-hash="{h}">Server {i}</div>"#))
            .collect();
        format!(
            r#"<html><head><title>Movie</title></head><body>
            <iframe src="//cloudnestra.test/rcp/first"></iframe>
            <div class="serversList">{items}</div>
            <script>var backup = "https://backup.test/unused.m3u8";</script>
            </body></html>"#
        )
    }

    #[tokio::test]
    async fn survivor_of_failing_handshakes_is_the_only_stream() {
        let stub = Arc::new(
            StubFetcher::new()
                .route(&format!("{EMBED}/movie/tt0120737"), 200, &servers_page(&["a", "b", "c"]))
                .route(&format!("{ORIGIN}/rcp/a"), 500, "")
                .route(&format!("{ORIGIN}/rcp/b"), 502, "")
                .route(&format!("{ORIGIN}/rcp/c"), 200, "src: '/prorcp/c2'")
                .route(&format!("{ORIGIN}/prorcp/c2"), 200, "file: 'https://cdn.test/movie.mp4'"),
        );

        let streams = resolver(&stub)
            .resolve("tt0120737", MediaKind::Movie)
            .await
            .unwrap();

        assert_eq!(streams.len(), 1);
        let stream = &streams[0];
        assert_eq!(stream.display_name, "Movie - Server 2");
        assert_eq!(stream.stream_url, "https://cdn.test/movie.mp4");
        assert_eq!(stream.referer_origin, ORIGIN);
        assert_eq!(stream.media_id, "tt0120737");
        assert!(stream.hls_data.is_none());
        assert!(!stub.requested().iter().any(|u| u.contains("backup.test")));
    }

    #[tokio::test]
    async fn structured_stream_carries_hls_variants() {
        let stub = Arc::new(
            StubFetcher::new()
                .route(&format!("{EMBED}/tv/500/2-5"), 200, &servers_page(&["x"]))
                .route(&format!("{ORIGIN}/rcp/x"), 200, "src: '/prorcp/x2'")
                .route(&format!("{ORIGIN}/prorcp/x2"), 200, "file: 'https://cdn.test/hls/master.m3u8'")
                .route("https://cdn.test/hls/master.m3u8", 200, MASTER),
        );

        let streams = resolver(&stub).resolve("500:2:5", MediaKind::Series).await.unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].media_id, "500");
        let hls = streams[0].hls_data.as_ref().unwrap();
        assert_eq!(hls.qualities[0].url, "https://cdn.test/hls/1080.m3u8");

        let listing = records(&streams);
        let titles: Vec<&str> = listing.iter().map(|r| r.display_title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Movie - Server 0 - Auto Quality",
                "Movie - Server 0 - 1920x1080 (1080p)",
                "Movie - Server 0 - 1280x720 (720p)",
            ]
        );
        assert!(listing.iter().all(|r| r.is_adaptive && r.referer_origin == ORIGIN));
    }

    #[tokio::test]
    async fn failed_handshakes_fall_back_to_page_scanning() {
        let stub = Arc::new(
            StubFetcher::new()
                .route(&format!("{EMBED}/movie/tt1"), 200, &servers_page(&["a"]))
                .route("https://backup.test/unused.m3u8", 200, MASTER),
        );

        let streams = resolver(&stub).resolve("tt1", MediaKind::Movie).await.unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].display_name, "Movie - VidSRC");
        assert_eq!(streams[0].stream_url, "https://backup.test/unused.m3u8");
        assert_eq!(streams[0].hls_data.as_ref().unwrap().qualities.len(), 2);
    }

    #[tokio::test]
    async fn proxy_streams_are_tagged_with_server() {
        let page = r#"<title></title><script>cfg = {server: "filemoon", id: "f1"}</script>"#;
        let stub = Arc::new(
            StubFetcher::new()
                .route(&format!("{EMBED}/movie/tt2"), 200, page)
                .route(&format!("{ORIGIN}/proxy/filemoon/f1"), 200, "file: 'https://fm.test/v.mp4'"),
        );

        let streams = resolver(&stub).resolve("tt2", MediaKind::Movie).await.unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].display_name, "VidSRC (filemoon)");
        let listing = streams[0].records();
        assert_eq!(listing.len(), 1);
        assert!(!listing[0].is_adaptive);
    }

    #[tokio::test]
    async fn proxy_and_media_file_streams_are_both_emitted() {
        let page = r#"<title>T</title><script>cfg = {server: "filemoon", id: "f1"}</script>
            <video src="https://cdn.test/fallback.mp4"></video>"#;
        let stub = Arc::new(
            StubFetcher::new()
                .route(&format!("{EMBED}/movie/tt5"), 200, page)
                .route(&format!("{ORIGIN}/proxy/filemoon/f1"), 200, "file: 'https://fm.test/v.mp4'"),
        );

        let streams = resolver(&stub).resolve("tt5", MediaKind::Movie).await.unwrap();
        let named: Vec<(&str, &str)> = streams
            .iter()
            .map(|s| (s.display_name.as_str(), s.stream_url.as_str()))
            .collect();
        assert_eq!(
            named,
            vec![
                ("T - VidSRC (filemoon)", "https://fm.test/v.mp4"),
                ("T - VidSRC (mp4)", "https://cdn.test/fallback.mp4"),
            ]
        );
    }

    #[tokio::test]
    async fn chased_iframe_origin_is_the_stream_referer() {
        let page = r#"<title>Show</title><iframe src="https://player.test/e/9"></iframe>"#;
        let stub = Arc::new(
            StubFetcher::new()
                .route(&format!("{EMBED}/movie/tt6"), 200, page)
                .route("https://player.test/e/9", 200, r#"file:"https://player.test/hls/9.m3u8""#)
                .route("https://player.test/hls/9.m3u8", 200, MASTER),
        );

        let streams = resolver(&stub).resolve("tt6", MediaKind::Movie).await.unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].referer_origin, "https://player.test");
        assert_eq!(streams[0].display_name, "Show - VidSRC");
        assert!(streams[0].hls_data.is_some());

        assert_eq!(
            stub.referer_for(&format!("{EMBED}/movie/tt6")).as_deref(),
            Some("https://cloudnestra.test/")
        );
        assert_eq!(
            stub.referer_for("https://player.test/hls/9.m3u8").as_deref(),
            Some("https://player.test/")
        );
        assert!(records(&streams)
            .iter()
            .all(|r| r.referer_origin == "https://player.test"));
    }

    #[tokio::test]
    async fn custom_chain_replaces_default_order() {
        let page = r#"<title>M</title> https://cdn.test/master.m3u8 https://cdn.test/movie.mp4"#;
        let stub = Arc::new(
            StubFetcher::new()
                .route(&format!("{EMBED}/movie/tt7"), 200, page)
                .route("https://cdn.test/master.m3u8", 200, MASTER),
        );
        let chain = HeuristicChain::with_strategies(vec![Box::new(MediaFileFallback)]);

        let streams = resolver(&stub)
            .with_chain(chain)
            .resolve("tt7", MediaKind::Movie)
            .await
            .unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].display_name, "M - VidSRC (mp4)");
        assert_eq!(streams[0].stream_url, "https://cdn.test/movie.mp4");
        assert!(!stub.requested().iter().any(|u| u.contains("master.m3u8")));
    }

    #[tokio::test]
    async fn page_without_structure_or_patterns_is_empty() {
        let stub = Arc::new(StubFetcher::new().route(
            &format!("{EMBED}/movie/tt3"),
            200,
            "<html><head><title>x</title></head><body>Coming soon</body></html>",
        ));
        let streams = resolver(&stub).resolve("tt3", MediaKind::Movie).await.unwrap();
        assert!(streams.is_empty());
    }

    #[tokio::test]
    async fn unavailable_embed_page_is_empty() {
        let stub = Arc::new(StubFetcher::new().route(&format!("{EMBED}/movie/tt4"), 503, ""));
        let streams = resolver(&stub).resolve("tt4", MediaKind::Movie).await.unwrap();
        assert!(streams.is_empty());
        assert_eq!(stub.requested().len(), 1);
    }

    #[tokio::test]
    async fn malformed_episode_is_input_error_without_fetching() {
        let stub = Arc::new(StubFetcher::new());
        let err = resolver(&stub).resolve("500:2", MediaKind::Series).await.unwrap_err();
        assert!(matches!(err, ResolveError::InvalidIdentifier { .. }));
        assert!(stub.requested().is_empty());
    }

    #[tokio::test]
    async fn concurrent_runs_keep_their_own_origin() {
        let page_a = r#"<iframe src="https://alpha.test/e/1"></iframe> https://alpha.test/a.mp4"#;
        let page_b = r#"<iframe src="https://beta.test/e/2"></iframe> https://beta.test/b.mp4"#;
        let stub = Arc::new(
            StubFetcher::new()
                .route(&format!("{EMBED}/movie/ta"), 200, page_a)
                .route(&format!("{EMBED}/movie/tb"), 200, page_b),
        );
        let resolver = resolver(&stub);

        let (a, b) = tokio::join!(
            resolver.resolve("ta", MediaKind::Movie),
            resolver.resolve("tb", MediaKind::Movie)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a[0].referer_origin, "https://alpha.test");
        assert_eq!(b[0].referer_origin, "https://beta.test");
        assert_eq!(a[0].display_name, "VidSRC (mp4)");
    }

    #[test]
    fn raw_record_uses_display_name() {
        let stream = ResolvedStream {
            display_name: "Title - VidSRC".into(),
            poster_image: None,
            media_id: "tt1".into(),
            stream_url: "https://a.test/x.m3u8".into(),
            referer_origin: ORIGIN.into(),
            hls_data: None,
        };
        assert_eq!(
            stream.records(),
            vec![StreamRecord {
                display_title: "Title - VidSRC".into(),
                url: "https://a.test/x.m3u8".into(),
                is_adaptive: true,
                referer_origin: ORIGIN.into(),
            }]
        );
    }
}
