//! Platform configuration loaded from TOML.

use std::path::Path;

use anyhow::{Context, Result};
use edge_assembler::AssemblerConfig;
use edge_classifier::ClassifierConfig;
use edge_observability::{LogFormat, LogLevel};
use serde::{Deserialize, Serialize};

/// Session logging settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: LogLevel::Info,
        }
    }
}

/// Top-level configuration. Every table is optional.
///
/// ```toml
/// [classifier]
/// exact_agents = ["internal-prerender"]
///
/// [assembler]
/// not_found_html = "<h1>Gone</h1>"
///
/// [logging]
/// format = "human"
/// level = "debug"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub classifier: ClassifierConfig,
    pub assembler: AssemblerConfig,
    pub logging: LoggingConfig,
}

impl PlatformConfig {
    /// Parse from a TOML string.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("invalid platform configuration")
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&source)
            .with_context(|| format!("failed to load config file {}", path.display()))
    }
}
