//! `stremsrc` - Stream resolution for VidSRC embed pages
//!
//! # Pipeline
//!
//! - **Identifiers**: `tt0120737` (movie) or `500:2:5` (series episode)
//! - **Embed page**: fetched with rotated browser headers, parsed for the
//!   player iframe origin, title, and declared servers
//! - **Server handshake**: `rcp` → `prorcp` token exchange per server, concurrently
//! - **Page scanning**: ordered fallback strategies when no server resolves
//! - **HLS**: master playlists expanded into bandwidth-ordered variants
//!
//! # Example
//!
//! ```rust,no_run
//! use stremsrc::{MediaKind, Resolver, ResolverConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = Resolver::new(ResolverConfig::load()?)?;
//!     for stream in resolver.resolve("tt0120737", MediaKind::Movie).await? {
//!         println!("{} -> {}", stream.display_name, stream.stream_url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod handshake;
pub mod hls;
pub mod http_client;
pub mod identifier;
pub mod resolver;

pub use config::ResolverConfig;
pub use context::RunContext;
pub use document::{EmbedDocument, ServerEntry};
pub use error::{ResolveError, Result};
pub use extract::{Candidate, HeuristicChain, Strategy};
pub use fingerprint::HeaderProfile;
pub use hls::{HlsManifest, QualityVariant};
pub use http_client::{FetchResponse, Fetcher, HttpFetcher};
pub use identifier::{MediaIdentifier, MediaKind};
pub use resolver::{ResolvedStream, Resolver, StreamRecord};

/// Version of stremsrc
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
