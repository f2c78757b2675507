//! Outbound header rotation
//!
//! Every upstream request gets a freshly drawn header profile so a single
//! resolution run does not present one fixed identity to the embed host.
//! The `Referer` always points at the run's current origin.

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};

use crate::error::{ResolveError, Result};

/// Realistic desktop browser user agents (Chrome/Firefox/Safari, 2024-2025)
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:129.0) Gecko/20100101 Firefox/129.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

const DEFAULT_ACCEPT: &str = "*/*";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// One generated request identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProfile {
    pub accept: String,
    pub accept_language: String,
    pub user_agent: String,
    pub referer: String,
}

impl HeaderProfile {
    /// Draw a new profile whose referer is `origin` with a trailing `/`.
    #[must_use]
    pub fn generate(origin: &str) -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        Self {
            accept: DEFAULT_ACCEPT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            user_agent: user_agent.to_string(),
            referer: format!("{}/", origin.trim_end_matches('/')),
        }
    }

    /// Convert profile to reqwest `HeaderMap`
    ///
    /// Fixed fields are static; the referer comes from a discovered origin
    /// and is validated.
    pub fn to_headers(&self) -> Result<HeaderMap> {
        let value = |name: &str, v: &str| {
            HeaderValue::from_str(v).map_err(|e| ResolveError::Header(format!("{name}: {e}")))
        };

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, value("accept", &self.accept)?);
        headers.insert(ACCEPT_LANGUAGE, value("accept-language", &self.accept_language)?);
        headers.insert(USER_AGENT, value("user-agent", &self.user_agent)?);
        headers.insert(REFERER, value("referer", &self.referer)?);
        Ok(headers)
    }
}
