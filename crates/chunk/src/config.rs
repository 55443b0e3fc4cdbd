// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Engine configuration.
//!
//! Configuration can be built in code or loaded from TOML, typically a
//! `chunk.toml` next to the templates.
//!
//! # Example Configuration
//!
//! ```toml
//! [parser]
//! smart_trim = true
//! max_depth = 128
//!
//! [render]
//! max_include_depth = 32
//!
//! [cache]
//! enabled = true
//! capacity = 256
//! ttl_secs = 600
//! sweep_every = 64
//! ```

use crate::error::{ChunkError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Parser settings.
    #[serde(default)]
    pub parser: ParseOptions,
    /// Renderer settings.
    #[serde(default)]
    pub render: RenderOptions,
    /// Parsed-template cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Options that change how a source string is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParseOptions {
    /// Remove the lines occupied by block control tags (default: true).
    #[serde(default = "default_smart_trim")]
    pub smart_trim: bool,

    /// Deepest block nesting grouped before an error marker is emitted
    /// instead (default: 128).
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_smart_trim() -> bool {
    true
}

fn default_max_depth() -> usize {
    128
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            smart_trim: default_smart_trim(),
            max_depth: default_max_depth(),
        }
    }
}

/// Options for the reference renderer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenderOptions {
    /// How many includes or macros may nest before rendering stops with an
    /// inline error marker (default: 32).
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
}

fn default_max_include_depth() -> usize {
    32
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_include_depth: default_max_include_depth(),
        }
    }
}

/// Settings for [`crate::TemplateCache`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Whether the engine caches parsed templates (default: true).
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Maximum number of cached templates (default: 256).
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Idle time in seconds after which an entry may be evicted (default: 600).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Run an eviction sweep every this many cache misses (default: 64).
    #[serde(default = "default_sweep_every")]
    pub sweep_every: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_capacity() -> usize {
    256
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_sweep_every() -> u64 {
    64
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            capacity: default_capacity(),
            ttl_secs: default_ttl_secs(),
            sweep_every: default_sweep_every(),
        }
    }
}

impl CacheConfig {
    /// Idle time after which an entry may be evicted.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl EngineConfig {
    /// Parses configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ChunkError::ConfigError(e.to_string()))
    }

    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.parser.smart_trim);
        assert_eq!(config.parser.max_depth, 128);
        assert_eq!(config.render.max_include_depth, 32);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.capacity, 256);
        assert_eq!(config.cache.ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
[parser]
smart_trim = false

[cache]
capacity = 8
"#,
        )
        .unwrap();
        assert!(!config.parser.smart_trim);
        assert_eq!(config.parser.max_depth, 128);
        assert_eq!(config.cache.capacity, 8);
        assert_eq!(config.cache.sweep_every, 64);
    }

    #[test]
    fn test_empty_toml() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let err = EngineConfig::from_toml_str("[parser]\nmax_depth = \"deep\"").unwrap_err();
        assert!(matches!(err, ChunkError::ConfigError(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[render]\nmax_include_depth = 4").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.render.max_include_depth, 4);
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_file("/definitely/not/here/chunk.toml").unwrap_err();
        assert!(matches!(err, ChunkError::IoError(_)));
    }
}
