//! Heuristic extraction over raw page text.
//!
//! Used when the structured server handshake yields nothing. Each
//! [`Strategy`] turns page text into candidate stream URLs; the
//! [`HeuristicChain`] tries them in registration order and stops at the
//! first one that produces any candidate. The server/id proxy step is the
//! exception: its results are kept and the later steps still run.
//!
//! The scanners are plain functions returning empty results on no match,
//! so they can be tested and reordered independently of the network.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::context::{origin_of, RunContext};
use crate::document::first_iframe_src;
use crate::hls::is_playlist_url;
use crate::http_client::Fetcher;

static PLAYLIST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'\\]+\.m3u8[^\s"'\\]*"#).expect("valid playlist regex")
});
static MEDIA_FILE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'\\]+\.mp4[^\s"'\\]*"#).expect("valid media regex")
});
static SOURCES_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)sources\s*:\s*(\[[^\]]+\])").expect("valid sources regex")
});
static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").expect("valid key regex")
});
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([\]\}])").expect("valid comma regex"));
static SERVER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)server\s*[:=]\s*['"]?([a-z0-9_\-]+)['"]?\s*[,;\}]?\s*id\s*[:=]\s*['"]?([a-z0-9_\-]+)['"]?"#,
    )
    .expect("valid server/id regex")
});
static PROXY_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)file\s*[:=]\s*["']([^"']+)["']"#).expect("valid proxy file regex")
});
static PROXY_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)src\s*[:=]\s*["']([^"']+)["']"#).expect("valid proxy src regex")
});

/// Keys checked, in order, on each `sources` entry.
const SOURCE_KEYS: &[&str] = &["file", "src", "file_url", "url"];

/// A stream URL found by a strategy, before HLS expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    /// Name suffix, e.g. the proxy server or `mp4`.
    pub tag: Option<String>,
}

impl Candidate {
    fn plain(url: String) -> Self {
        Self { url, tag: None }
    }

    fn tagged(url: String, tag: &str) -> Self {
        Self {
            url,
            tag: Some(tag.to_string()),
        }
    }
}

// ─── Scanners ────────────────────────────────────────────────────────────────

/// First absolute URL ending in `.m3u8` (query string allowed).
pub fn first_playlist_url(text: &str) -> Option<String> {
    PLAYLIST_URL.find(text).map(|m| m.as_str().to_string())
}

/// First absolute URL ending in `.mp4` (query string allowed).
pub fn first_media_file_url(text: &str) -> Option<String> {
    MEDIA_FILE_URL.find(text).map(|m| m.as_str().to_string())
}

/// URLs from an embedded `sources: [...]` array.
///
/// Bounded mini-parser, not a JavaScript evaluator:
/// - only the first `sources` array, and only up to its first `]`
/// - single quotes become double quotes
/// - bare object keys get quoted, trailing commas are dropped
/// - only flat objects count; the first of `file`, `src`, `file_url`, `url`
///   holding a non-empty string is taken
pub fn sources_array(text: &str) -> Vec<String> {
    let Some(fragment) = SOURCES_ARRAY.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };

    let normalized = fragment.as_str().replace('\'', "\"");
    let entries: Vec<Value> = match serde_json::from_str(&normalized) {
        Ok(entries) => entries,
        Err(_) => {
            let keyed = BARE_KEY.replace_all(&normalized, "$1\"$2\":");
            let cleaned = TRAILING_COMMA.replace_all(&keyed, "$1");
            match serde_json::from_str(&cleaned) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Discarding unparseable sources array: {e}");
                    return Vec::new();
                }
            }
        }
    };

    entries
        .iter()
        .filter_map(|entry| {
            let object = entry.as_object()?;
            SOURCE_KEYS.iter().find_map(|key| {
                object
                    .get(*key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            })
        })
        .collect()
}

/// `(server, id)` pairs in order of first appearance, duplicates removed.
pub fn server_id_pairs(text: &str) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    SERVER_ID
        .captures_iter(text)
        .filter_map(|caps| {
            let pair = (caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string());
            seen.insert(pair.clone()).then_some(pair)
        })
        .collect()
}

/// Stream URL in a proxy response: playlist URL, then `file`, then `src`.
pub fn proxy_stream_url(text: &str) -> Option<String> {
    first_playlist_url(text)
        .or_else(|| capture(&PROXY_FILE, text))
        .or_else(|| capture(&PROXY_SRC, text))
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

// ─── Strategies ──────────────────────────────────────────────────────────────

/// One fallback step of the chain.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Candidates found in `page`; empty when the step does not apply.
    async fn candidates(
        &self,
        page: &str,
        ctx: &mut RunContext,
        fetcher: &dyn Fetcher,
    ) -> Vec<Candidate>;

    /// When `true`, later strategies still run after this one matched and
    /// their candidates are appended.
    fn continues_after_match(&self) -> bool {
        false
    }
}

/// Embedded `sources: [...]` arrays.
pub struct SourcesArray;

#[async_trait]
impl Strategy for SourcesArray {
    fn name(&self) -> &'static str {
        "sources-array"
    }

    async fn candidates(&self, page: &str, _: &mut RunContext, _: &dyn Fetcher) -> Vec<Candidate> {
        sources_array(page).into_iter().map(Candidate::plain).collect()
    }
}

/// A playlist URL written directly in the page.
pub struct DirectPlaylist;

#[async_trait]
impl Strategy for DirectPlaylist {
    fn name(&self) -> &'static str {
        "direct-playlist"
    }

    async fn candidates(&self, page: &str, _: &mut RunContext, _: &dyn Fetcher) -> Vec<Candidate> {
        first_playlist_url(page).map(Candidate::plain).into_iter().collect()
    }
}

/// `server: "...", id: "..."` fragments resolved via `{origin}/proxy/{server}/{id}`.
pub struct ServerIdProxy;

impl ServerIdProxy {
    async fn resolve(
        fetcher: &dyn Fetcher,
        ctx: &RunContext,
        server: &str,
        id: &str,
    ) -> Option<String> {
        let url = format!("{}/proxy/{server}/{id}", ctx.origin());
        let headers = ctx.headers().ok()?;
        match fetcher.get(&url, headers).await {
            Ok(resp) if resp.is_success() => proxy_stream_url(&resp.body),
            Ok(resp) => {
                debug!(%url, status = resp.status, "Proxy returned non-success");
                None
            }
            Err(e) => {
                debug!(%url, "Proxy fetch failed: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl Strategy for ServerIdProxy {
    fn name(&self) -> &'static str {
        "server-id-proxy"
    }

    fn continues_after_match(&self) -> bool {
        true
    }

    async fn candidates(
        &self,
        page: &str,
        ctx: &mut RunContext,
        fetcher: &dyn Fetcher,
    ) -> Vec<Candidate> {
        let pairs: Vec<(String, String)> = server_id_pairs(page)
            .into_iter()
            .filter(|(server, id)| ctx.mark_attempted(server, id))
            .collect();
        if pairs.is_empty() {
            return Vec::new();
        }

        let ctx: &RunContext = ctx;
        let lookups = pairs.iter().map(|(server, id)| async move {
            Self::resolve(fetcher, ctx, server, id)
                .await
                .map(|url| Candidate::tagged(url, server))
        });

        join_all(lookups).await.into_iter().flatten().collect()
    }
}

/// Follows the page's iframe and scans the target for a playlist URL.
pub struct IframeChase;

#[async_trait]
impl Strategy for IframeChase {
    fn name(&self) -> &'static str {
        "iframe-chase"
    }

    async fn candidates(
        &self,
        page: &str,
        ctx: &mut RunContext,
        fetcher: &dyn Fetcher,
    ) -> Vec<Candidate> {
        let Some(src) = first_iframe_src(page) else {
            return Vec::new();
        };
        let Some(target) = absolutize(&src, ctx.origin()) else {
            debug!(%src, "Iframe target is not resolvable");
            return Vec::new();
        };

        if is_playlist_url(&target) {
            return vec![Candidate::plain(target)];
        }

        ctx.adopt_origin_of(&target);
        let Ok(headers) = ctx.headers() else {
            return Vec::new();
        };
        match fetcher.get(&target, headers).await {
            Ok(resp) if resp.is_success() => first_playlist_url(&resp.body)
                .map(Candidate::plain)
                .into_iter()
                .collect(),
            Ok(resp) => {
                debug!(%target, status = resp.status, "Iframe target returned non-success");
                Vec::new()
            }
            Err(e) => {
                debug!(%target, "Iframe fetch failed: {e}");
                Vec::new()
            }
        }
    }
}

/// Last resort: any direct `.mp4` URL in the page.
pub struct MediaFileFallback;

#[async_trait]
impl Strategy for MediaFileFallback {
    fn name(&self) -> &'static str {
        "media-file"
    }

    async fn candidates(&self, page: &str, _: &mut RunContext, _: &dyn Fetcher) -> Vec<Candidate> {
        first_media_file_url(page)
            .map(|url| Candidate::tagged(url, "mp4"))
            .into_iter()
            .collect()
    }
}

/// Resolve an iframe `src` (already protocol-normalized) against `origin`.
fn absolutize(src: &str, origin: &str) -> Option<String> {
    if origin_of(src).is_some() {
        return Some(src.to_string());
    }
    Url::parse(origin).ok()?.join(src).ok().map(String::from)
}

// ─── Chain ───────────────────────────────────────────────────────────────────

/// Ordered fallback strategies.
///
/// Runs until a strategy yields candidates, unless that strategy
/// [continues after a match](Strategy::continues_after_match); in that case
/// the following strategies run too and their candidates are appended.
pub struct HeuristicChain {
    strategies: Vec<Box<dyn Strategy>>,
}

impl HeuristicChain {
    /// Default order: sources array, direct playlist, server/id proxy,
    /// iframe chase, media file.
    #[must_use]
    pub fn new() -> Self {
        Self::with_strategies(vec![
            Box::new(SourcesArray),
            Box::new(DirectPlaylist),
            Box::new(ServerIdProxy),
            Box::new(IframeChase),
            Box::new(MediaFileFallback),
        ])
    }

    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// Strategy names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run strategies over `page`, collecting candidates in strategy order.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        page: &str,
        ctx: &mut RunContext,
        fetcher: &dyn Fetcher,
    ) -> Vec<Candidate> {
        let mut collected = Vec::new();
        for strategy in &self.strategies {
            let found = strategy.candidates(page, ctx, fetcher).await;
            if found.is_empty() {
                debug!(strategy = strategy.name(), "Strategy found nothing");
                continue;
            }

            debug!(strategy = strategy.name(), count = found.len(), "Strategy matched");
            collected.extend(found);
            if !strategy.continues_after_match() {
                break;
            }
        }
        collected
    }
}

impl Default for HeuristicChain {
    fn default() -> Self {
        Self::new()
    }
}
