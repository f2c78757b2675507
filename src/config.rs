//! Resolver configuration loaded from `~/.config/stremsrc/config.toml`.
//!
//! Every field has a default, so the file is optional. `STREMSRC_EMBED_BASE`
//! and `STREMSRC_ORIGIN` override the two upstream bases after the file is read.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Embed host queried for movie and episode pages.
pub const DEFAULT_EMBED_BASE: &str = "https://vidsrc.to/embed";

/// Origin used for relative requests until an iframe reveals another one.
pub const DEFAULT_ORIGIN: &str = "https://cloudnestra.com";

/// Label used when naming streams found by page scanning.
pub const DEFAULT_PROVIDER_LABEL: &str = "VidSRC";

const EMBED_BASE_ENV: &str = "STREMSRC_EMBED_BASE";
const ORIGIN_ENV: &str = "STREMSRC_ORIGIN";

/// Tunables for one [`crate::Resolver`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub embed_base: String,
    pub default_origin: String,
    pub provider_label: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_redirects: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            embed_base: DEFAULT_EMBED_BASE.to_string(),
            default_origin: DEFAULT_ORIGIN.to_string(),
            provider_label: DEFAULT_PROVIDER_LABEL.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            max_redirects: 10,
        }
    }
}

impl ResolverConfig {
    /// Load from the default config path, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_path(&config_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        Self::from_toml(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Parse a TOML document; omitted keys keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Apply `STREMSRC_*` overrides using `lookup` to read variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = lookup(EMBED_BASE_ENV).filter(|v| !v.trim().is_empty()) {
            self.embed_base = base;
        }
        if let Some(origin) = lookup(ORIGIN_ENV).filter(|v| !v.trim().is_empty()) {
            self.default_origin = origin;
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        self.embed_base = self.embed_base.trim().trim_end_matches('/').to_string();
        self.default_origin = self.default_origin.trim().trim_end_matches('/').to_string();
    }
}

/// Return the path to the config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stremsrc")
        .join("config.toml")
}
