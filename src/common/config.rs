//! Configuration file handling

use serde::Deserialize;
use std::path::Path;

use super::paths::config_path;
use super::Result;
use crate::result::OutputFormat;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Stream routing defaults
    #[serde(default)]
    pub filter: FilterConfig,

    /// Result rendering settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Stream routing defaults, overridden by command line flags
#[derive(Debug, Deserialize, Default)]
pub struct FilterConfig {
    /// Discard non-subunit input instead of echoing it to stdout
    #[serde(default)]
    pub no_passthrough: bool,

    /// Copy subunit packets to the output destination as well
    #[serde(default)]
    pub forward: bool,
}

/// Result rendering settings
#[derive(Debug, Deserialize, Default)]
pub struct OutputConfig {
    /// Format used to render test results
    #[serde(default)]
    pub format: OutputFormat,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
