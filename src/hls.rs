//! HLS master playlist expansion
//!
//! Turns a master playlist into quality variants ordered by bandwidth,
//! highest first. Tokenizing is delegated to `m3u8-rs`; this module only
//! filters, orders, resolves URIs, and names the variants.

use m3u8_rs::VariantStream;
use reqwest::header::HeaderMap;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{ResolveError, Result};
use crate::http_client::Fetcher;

/// Tag that only appears in master playlists.
pub const MASTER_MARKER: &str = "#EXT-X-STREAM-INF";

const PLAYLIST_HEADER: &str = "#EXTM3U";

/// One rendition referenced from a master playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityVariant {
    /// `WIDTHxHEIGHT`, when declared.
    pub resolution: Option<String>,
    pub bandwidth: u64,
    pub codecs: Option<String>,
    pub frame_rate: Option<f64>,
    pub url: String,
    pub title: String,
}

/// A parsed master playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HlsManifest {
    pub master_url: String,
    /// Non-increasing bandwidth; equal bandwidths keep manifest order.
    pub qualities: Vec<QualityVariant>,
}

/// Returns `true` if `url` looks like an HLS playlist.
pub fn is_playlist_url(url: &str) -> bool {
    url.to_ascii_lowercase().contains(".m3u8")
}

/// Parse master playlist text fetched from `base_url`.
///
/// A missing `#EXTM3U` header is tolerated.
pub fn parse_master(text: &str, base_url: &str) -> Result<HlsManifest> {
    let body = text.trim_start_matches('\u{feff}').trim_start();
    let mut input = if body.starts_with(PLAYLIST_HEADER) {
        body.to_string()
    } else {
        format!("{PLAYLIST_HEADER}\n{body}")
    };
    if !input.ends_with('\n') {
        input.push('\n');
    }

    let playlist = m3u8_rs::parse_master_playlist_res(input.as_bytes())
        .map_err(|e| ResolveError::Manifest(e.to_string()))?;

    let base = Url::parse(base_url).ok();
    let mut variants: Vec<VariantStream> = playlist
        .variants
        .into_iter()
        .filter(|v| !v.is_i_frame && !v.uri.trim().is_empty())
        .collect();

    // Stable: equal bandwidths keep manifest order.
    variants.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));

    let qualities = variants
        .into_iter()
        .filter_map(|variant| {
            let Some(url) = resolve_variant_url(base.as_ref(), &variant.uri) else {
                debug!(uri = %variant.uri, "Skipping variant with unresolvable URI");
                return None;
            };
            let dims = variant.resolution.map(|r| (r.width, r.height));
            Some(QualityVariant {
                resolution: dims.map(|(w, h)| format!("{w}x{h}")),
                bandwidth: variant.bandwidth,
                codecs: variant.codecs,
                frame_rate: variant.frame_rate,
                url,
                title: quality_title(dims, variant.bandwidth),
            })
        })
        .collect();

    Ok(HlsManifest {
        master_url: base_url.to_string(),
        qualities,
    })
}

/// Fetch `url` and parse it as a master playlist.
///
/// Returns `None` on transport failure, non-success status, a body without
/// [`MASTER_MARKER`] (media playlists, HTML, ...), or a tokenizer error.
#[instrument(skip(fetcher, headers), fields(url = %url))]
pub async fn fetch_and_parse(
    fetcher: &dyn Fetcher,
    url: &str,
    headers: HeaderMap,
) -> Option<HlsManifest> {
    let response = match fetcher.get(url, headers).await {
        Ok(r) => r,
        Err(e) => {
            debug!("Playlist fetch failed: {e}");
            return None;
        }
    };

    if !response.is_success() {
        debug!(status = response.status, "Playlist fetch returned non-success");
        return None;
    }

    if !response.body.contains(MASTER_MARKER) {
        debug!("Not a master playlist");
        return None;
    }

    match parse_master(&response.body, url) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            debug!("Discarding malformed master playlist: {e}");
            None
        }
    }
}

/// Absolute URIs pass through; relative ones resolve against `base`.
fn resolve_variant_url(base: Option<&Url>, uri: &str) -> Option<String> {
    let uri = uri.trim();
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return Some(uri.to_string());
    }
    base?.join(uri).ok().map(String::from)
}

/// Human-readable name for a variant.
///
/// With a resolution the height picks the bucket; otherwise bandwidth does.
pub fn quality_title(resolution: Option<(u64, u64)>, bandwidth: u64) -> String {
    match resolution {
        Some((width, height)) => {
            let res = format!("{width}x{height}");
            match height {
                h if h >= 1080 => format!("{res} (1080p)"),
                h if h >= 720 => format!("{res} (720p)"),
                h if h >= 480 => format!("{res} (480p)"),
                h if h >= 360 => format!("{res} (360p)"),
                _ => res,
            }
        }
        None if bandwidth > 5_000_000 => "High Quality".to_string(),
        None if bandwidth > 2_000_000 => "Medium Quality".to_string(),
        None => "Low Quality".to_string(),
    }
}
