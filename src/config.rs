//! Analyzer configuration
//!
//! Optional TOML file; every field has a default and command line flags
//! override whatever the file sets.

use std::path::Path;
use std::str::FromStr;

use scarlett_protocol::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AnalyzerError;
use crate::pcap_analyzer::PacketFilter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Size of the device memory shadow in bytes
    #[serde(default = "default_shadow_capacity")]
    pub shadow_capacity: usize,
    /// Highlight changed bytes and errors
    #[serde(default = "default_true")]
    pub color: bool,
    /// Printable rendering after the raw dump
    #[serde(default = "default_true")]
    pub ascii: bool,
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_shadow_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "all".to_string()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            shadow_capacity: default_shadow_capacity(),
            color: true,
            ascii: true,
            filter: default_filter(),
        }
    }
}

impl AnalyzerConfig {
    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> Result<Self, AnalyzerError> {
        if !path.exists() {
            warn!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| AnalyzerError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> Result<Self, AnalyzerError> {
        toml::from_str(content).map_err(|e| AnalyzerError::Config(e.to_string()))
    }

    pub fn packet_filter(&self) -> Result<PacketFilter, AnalyzerError> {
        PacketFilter::from_str(&self.filter).map_err(AnalyzerError::Config)
    }
}
