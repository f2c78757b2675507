//! Per-run resolution state.
//!
//! Each call to [`crate::Resolver::resolve`] owns one [`RunContext`]. The
//! discovered origin lives here rather than in a process-wide value, so
//! concurrent resolutions of different identifiers never observe each
//! other's origin.

use std::collections::HashSet;

use reqwest::header::HeaderMap;
use url::Url;

use crate::error::Result;
use crate::fingerprint::HeaderProfile;

/// State for one resolution run.
#[derive(Debug, Clone)]
pub struct RunContext {
    origin: String,
    /// Page title, best-effort (may be empty).
    pub title: String,
    /// `og:image` of the embed page, if any.
    pub poster: Option<String>,
    /// External id of the media being resolved.
    pub media_id: String,
    attempted: HashSet<(String, String)>,
}

impl RunContext {
    pub fn new(default_origin: &str, media_id: &str) -> Self {
        Self {
            origin: default_origin.trim_end_matches('/').to_string(),
            title: String::new(),
            poster: None,
            media_id: media_id.to_string(),
            attempted: HashSet::new(),
        }
    }

    /// Current origin, without trailing slash.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Replace the origin with the origin of `url`.
    ///
    /// Unparseable or opaque URLs leave the origin unchanged. Returns `true`
    /// when the origin was written.
    pub fn adopt_origin_of(&mut self, url: &str) -> bool {
        match origin_of(url) {
            Some(origin) => {
                self.origin = origin;
                true
            }
            None => false,
        }
    }

    /// Fresh request headers with `Referer` set to the current origin.
    pub fn headers(&self) -> Result<HeaderMap> {
        HeaderProfile::generate(&self.origin).to_headers()
    }

    /// Record a `(server, token)` pair; returns `false` if already attempted in this run.
    pub fn mark_attempted(&mut self, server: &str, token: &str) -> bool {
        self.attempted
            .insert((server.to_string(), token.to_string()))
    }
}

/// Normalize an iframe `src`: protocol-relative targets get `https:`.
pub fn normalize_src(src: &str) -> String {
    let src = src.trim();
    if src.starts_with("//") {
        format!("https:{src}")
    } else {
        src.to_string()
    }
}

/// Absolute origin (`scheme://host[:port]`) of `url`, if it has one.
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(&normalize_src(url)).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}
