//! Upstream HTTP transport
//!
//! [`Fetcher`] is the seam between the resolution pipeline and the network.
//! [`HttpFetcher`] is the production implementation:
//! - TLS via rustls
//! - Brotli, Gzip, Deflate compression (auto-negotiated)
//! - Connection pooling with keep-alive
//! - Connect and request timeouts from [`ResolverConfig`]
//!
//! Non-success statuses are returned to the caller, never raised: for an
//! uncooperative upstream a 404 is an ordinary outcome.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::config::ResolverConfig;
use crate::error::Result;

/// Status and decoded body of one GET request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    /// `true` for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests on behalf of the pipeline.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` with the given headers.
    ///
    /// Returns `Err` only for transport failures (DNS, TLS, timeout, body decode).
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<FetchResponse>;
}

/// reqwest-backed [`Fetcher`]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher using the timeouts and redirect limit from `config`.
    pub fn with_config(config: &ResolverConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self, headers), fields(url = %url))]
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<FetchResponse> {
        let response = self.client.get(url).headers(headers).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!(status, bytes = body.len(), "Response received");

        Ok(FetchResponse { status, body })
    }
}

/// In-memory fetcher for tests: fixed responses keyed by exact URL.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{async_trait, FetchResponse, Fetcher, HeaderMap, Result};

    #[derive(Default)]
    pub(crate) struct StubFetcher {
        routes: HashMap<String, FetchResponse>,
        requests: Mutex<Vec<(String, HeaderMap)>>,
    }

    impl StubFetcher {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Register a response; unregistered URLs answer 404 with an empty body.
        pub(crate) fn route(mut self, url: &str, status: u16, body: &str) -> Self {
            self.routes.insert(
                url.to_string(),
                FetchResponse {
                    status,
                    body: body.to_string(),
                },
            );
            self
        }

        pub(crate) fn requested(&self) -> Vec<String> {
            self.requests
                .lock()
                .map(|r| r.iter().map(|(url, _)| url.clone()).collect())
                .unwrap_or_default()
        }

        pub(crate) fn referer_for(&self, url: &str) -> Option<String> {
            let requests = self.requests.lock().ok()?;
            requests
                .iter()
                .find(|(u, _)| u == url)
                .and_then(|(_, h)| h.get("referer"))
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn get(&self, url: &str, headers: HeaderMap) -> Result<FetchResponse> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push((url.to_string(), headers));
            }
            Ok(self.routes.get(url).cloned().unwrap_or(FetchResponse {
                status: 404,
                body: String::new(),
            }))
        }
    }
}
