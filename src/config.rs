//! Global configuration for the `qc` CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Page size used by `qc query --page` when `--per-page` is not given
pub const DEFAULT_PER_PAGE: usize = 25;

/// Global querycraft configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Default project directory
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Default page size
    #[serde(default)]
    pub per_page: Option<usize>,

    /// Tracing filter used when RUST_LOG is not set (e.g. "querycraft=debug")
    #[serde(default)]
    pub log: Option<String>,
}

impl Config {
    /// Load config from the default location, or defaults if there is none
    pub fn load() -> Result<Self> {
        let config_path = Self::default_path();

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        toml::from_str(&contents).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Get default config file path
    /// Checks ~/.config/querycraft/config.toml first (XDG style),
    /// then falls back to the OS-specific location
    pub fn default_path() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("querycraft").join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("querycraft")
            .join("config.toml")
    }

    pub fn per_page(&self) -> usize {
        self.per_page.filter(|n| *n > 0).unwrap_or(DEFAULT_PER_PAGE)
    }
}
