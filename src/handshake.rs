//! Server handshake: `rcp` → `prorcp` → media URL.
//!
//! Each declared server carries an opaque token. The token is exchanged at
//! `{origin}/rcp/{token}` for a descriptor path; descriptor paths under the
//! `/prorcp/` redirector are fetched again and yield the final `file:` URL.
//! A server that fails at any hop simply resolves to nothing.

use std::sync::LazyLock;

use futures::future::join_all;
use regex::Regex;
use tracing::{debug, info, instrument};

use crate::context::RunContext;
use crate::document::ServerEntry;
use crate::http_client::Fetcher;

/// Prefix of descriptor paths that must go through the redirector.
pub const REDIRECTOR_MARKER: &str = "/prorcp/";

static SRC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src:\s*['"]([^'"]+)['"]"#).expect("valid src regex"));
static FILE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"file:\s*['"]([^'"]+)['"]"#).expect("valid file regex"));

/// A server whose handshake produced a media URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub server: ServerEntry,
    pub media_url: String,
}

/// First quoted `src:` value in `text`.
pub fn extract_src(text: &str) -> Option<String> {
    capture(&SRC_PATTERN, text)
}

/// First quoted `file:` value in `text`.
pub fn extract_file(text: &str) -> Option<String> {
    capture(&FILE_PATTERN, text)
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Run the handshake for every server concurrently.
///
/// Outcomes keep the declaration order of `servers`; failed servers are
/// dropped without affecting the others.
pub async fn resolve_servers(
    fetcher: &dyn Fetcher,
    ctx: &RunContext,
    servers: &[ServerEntry],
) -> Vec<HandshakeOutcome> {
    let attempts = servers.iter().map(|server| async move {
        resolve_server(fetcher, ctx, server)
            .await
            .map(|media_url| HandshakeOutcome {
                server: server.clone(),
                media_url,
            })
    });

    let outcomes: Vec<HandshakeOutcome> = join_all(attempts).await.into_iter().flatten().collect();

    info!(
        declared = servers.len(),
        resolved = outcomes.len(),
        "Server handshakes finished"
    );
    outcomes
}

/// Resolve one server to its media URL, or `None` if any hop fails.
#[instrument(skip(fetcher, ctx, server), fields(server = %server.display_name))]
pub async fn resolve_server(
    fetcher: &dyn Fetcher,
    ctx: &RunContext,
    server: &ServerEntry,
) -> Option<String> {
    let Some(token) = server.handshake_token.as_deref() else {
        debug!("Server has no handshake token");
        return None;
    };

    let rcp_url = format!("{}/rcp/{token}", ctx.origin());
    let descriptor = extract_src(&fetch_body(fetcher, ctx, &rcp_url).await?);
    let Some(descriptor) = descriptor else {
        debug!("No src descriptor in rcp response");
        return None;
    };

    let Some(remainder) = descriptor.strip_prefix(REDIRECTOR_MARKER) else {
        debug!(%descriptor, "Descriptor is not a redirector path");
        return None;
    };

    let prorcp_url = format!("{}{REDIRECTOR_MARKER}{remainder}", ctx.origin());
    let media_url = extract_file(&fetch_body(fetcher, ctx, &prorcp_url).await?);
    if media_url.is_none() {
        debug!("No file value in prorcp response");
    }
    media_url
}

async fn fetch_body(fetcher: &dyn Fetcher, ctx: &RunContext, url: &str) -> Option<String> {
    let headers = match ctx.headers() {
        Ok(h) => h,
        Err(e) => {
            debug!("Cannot build headers: {e}");
            return None;
        }
    };

    match fetcher.get(url, headers).await {
        Ok(resp) if resp.is_success() => Some(resp.body),
        Ok(resp) => {
            debug!(url, status = resp.status, "Handshake hop returned non-success");
            None
        }
        Err(e) => {
            debug!(url, "Handshake hop failed: {e}");
            None
        }
    }
}
