//! Embed page model.
//!
//! [`EmbedDocument::load`] parses the HTML once and copies out everything
//! later stages need, so no DOM is held across an await point.

use scraper::{Html, Selector};

use crate::context::{normalize_src, origin_of};

/// Structural pattern for declared servers: `.serversList .server`.
const SERVER_ITEM_SELECTOR: &str = ".serversList .server";
/// Attribute carrying the handshake token of a server item.
const HANDSHAKE_ATTR: &str = "data-hash";

/// One server declared by the embed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub display_name: String,
    /// Absent when the entry cannot go through the handshake.
    pub handshake_token: Option<String>,
}

/// Immutable snapshot of a fetched embed page.
#[derive(Debug, Clone)]
pub struct EmbedDocument {
    pub raw: String,
    /// Origin of the first iframe, or the origin passed to [`Self::load`].
    pub origin: String,
    pub title: String,
    pub poster: Option<String>,
    /// `src` of the first iframe, protocol-relative prefix already resolved.
    pub iframe_src: Option<String>,
    pub servers: Vec<ServerEntry>,
}

impl EmbedDocument {
    /// Parse `html`, falling back to `current_origin` when no iframe origin is found.
    ///
    /// Never fails: missing structure yields an empty title, no servers,
    /// and the unchanged origin.
    pub fn load(html: &str, current_origin: &str) -> Self {
        let doc = Html::parse_document(html);

        let iframe_src = first_attr(&doc, "iframe[src]", "src").map(|s| normalize_src(&s));
        let origin = iframe_src
            .as_deref()
            .and_then(origin_of)
            .unwrap_or_else(|| current_origin.to_string());

        let title = Selector::parse("title")
            .ok()
            .and_then(|sel| {
                doc.select(&sel)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
            })
            .unwrap_or_default();

        let poster = first_attr(&doc, r#"meta[property="og:image"]"#, "content")
            .filter(|p| !p.trim().is_empty());

        Self {
            raw: html.to_string(),
            origin,
            title,
            poster,
            iframe_src,
            servers: server_entries(&doc),
        }
    }
}

/// First iframe `src` in `html`, normalized. Used on pages that are not
/// loaded as a full [`EmbedDocument`].
pub fn first_iframe_src(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    first_attr(&doc, "iframe[src]", "src").map(|s| normalize_src(&s))
}

fn first_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .find_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn server_entries(doc: &Html) -> Vec<ServerEntry> {
    let Ok(sel) = Selector::parse(SERVER_ITEM_SELECTOR) else {
        return Vec::new();
    };

    doc.select(&sel)
        .map(|el| ServerEntry {
            display_name: el.text().collect::<String>().trim().to_string(),
            handshake_token: el
                .value()
                .attr(HANDSHAKE_ATTR)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        })
        .collect()
}
