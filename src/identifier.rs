//! Media identifiers and embed URL construction.
//!
//! Identifiers arrive as colon-delimited strings: `"tt0120737"` for a movie,
//! `"<show-id>:<season>:<episode>"` for an episode. The media kind decides
//! which shape is expected, so a series identifier without season/episode
//! segments is rejected instead of being coerced into a movie.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, Result};

/// Kind discriminator supplied alongside the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Series,
}

impl FromStr for MediaKind {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(Self::Movie),
            "series" | "tv" => Ok(Self::Series),
            other => Err(ResolveError::UnknownMediaKind(other.to_string())),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => f.write_str("movie"),
            Self::Series => f.write_str("series"),
        }
    }
}

/// A validated media identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaIdentifier {
    Movie {
        external_id: String,
    },
    Episode {
        external_id: String,
        season: u32,
        episode: u32,
    },
}

impl MediaIdentifier {
    /// Parse `raw` according to `kind`.
    ///
    /// Episodes must have exactly three non-empty segments with numeric
    /// season and episode numbers.
    pub fn parse(raw: &str, kind: MediaKind) -> Result<Self> {
        let raw = raw.trim();
        let invalid = |reason| ResolveError::InvalidIdentifier {
            id: raw.to_string(),
            reason,
        };

        match kind {
            MediaKind::Movie => {
                if raw.is_empty() {
                    return Err(invalid("empty identifier"));
                }
                Ok(Self::Movie {
                    external_id: raw.to_string(),
                })
            }
            MediaKind::Series => {
                let mut parts = raw.split(':');
                let external_id = parts.next().unwrap_or_default();
                if external_id.is_empty() {
                    return Err(invalid("empty show id"));
                }
                let season = parts.next().ok_or_else(|| invalid("missing season"))?;
                let episode = parts.next().ok_or_else(|| invalid("missing episode"))?;
                if parts.next().is_some() {
                    return Err(invalid("too many segments"));
                }

                Ok(Self::Episode {
                    external_id: external_id.to_string(),
                    season: season
                        .parse()
                        .map_err(|_| invalid("season is not a number"))?,
                    episode: episode
                        .parse()
                        .map_err(|_| invalid("episode is not a number"))?,
                })
            }
        }
    }

    /// External id shared by both variants (IMDb or catalog id).
    pub fn external_id(&self) -> &str {
        match self {
            Self::Movie { external_id } | Self::Episode { external_id, .. } => external_id,
        }
    }

    /// Embed page URL under `embed_base` (no trailing slash).
    pub fn embed_url(&self, embed_base: &str) -> String {
        let base = embed_base.trim_end_matches('/');
        match self {
            Self::Movie { external_id } => format!("{base}/movie/{external_id}"),
            Self::Episode {
                external_id,
                season,
                episode,
            } => format!("{base}/tv/{external_id}/{season}-{episode}"),
        }
    }
}

impl fmt::Display for MediaIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie { external_id } => f.write_str(external_id),
            Self::Episode {
                external_id,
                season,
                episode,
            } => write!(f, "{external_id}:{season}:{episode}"),
        }
    }
}
