//! Configuration management for streamrt.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (STREAMRT_REPLICAS, etc.)
//! 2. Project-local config file (`./streamrt.toml`)
//! 3. User config file (`~/.config/streamrt/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # streamrt.toml
//!
//! # Scratchpad bytes per cluster replica
//! scratchpad_bytes = 131072
//!
//! # Number of cluster replicas
//! replicas = 4
//!
//! # Transfer-engine channels
//! dma_channels = 2
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use crate::cluster::params::{
    DEFAULT_DMA_CHANNELS, DEFAULT_REPLICAS, DEFAULT_SCRATCHPAD_BYTES, MAX_REPLICAS, STREAM_ALIGN,
};

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// A configuration that cannot describe a valid cluster.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("replica count {0} outside 1..={max}", max = MAX_REPLICAS)]
    ReplicaCount(usize),
    #[error("scratchpad size {0} is not a positive multiple of {STREAM_ALIGN}")]
    ScratchpadSize(usize),
    #[error("channel count must be at least 1")]
    ChannelCount,
}

/// streamrt configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Scratchpad bytes per cluster replica.
    pub scratchpad_bytes: Option<usize>,

    /// Number of cluster replicas.
    pub replicas: Option<usize>,

    /// Transfer-engine channels.
    pub dma_channels: Option<usize>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `streamrt.toml`
    /// 3. User config `~/.config/streamrt/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load user config first (lowest priority of file configs)
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Load project-local config (higher priority)
        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Scratchpad bytes per replica, with fallback to default.
    pub fn scratchpad_bytes(&self) -> usize {
        self.scratchpad_bytes.unwrap_or(DEFAULT_SCRATCHPAD_BYTES)
    }

    /// Replica count, with fallback to default.
    pub fn replicas(&self) -> usize {
        self.replicas.unwrap_or(DEFAULT_REPLICAS)
    }

    /// Channel count, with fallback to default.
    pub fn dma_channels(&self) -> usize {
        self.dma_channels.unwrap_or(DEFAULT_DMA_CHANNELS)
    }

    /// Reject values no cluster can be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let replicas = self.replicas();
        if replicas == 0 || replicas > MAX_REPLICAS {
            return Err(ConfigError::ReplicaCount(replicas));
        }
        let spm = self.scratchpad_bytes();
        if spm == 0 || spm % STREAM_ALIGN != 0 {
            return Err(ConfigError::ScratchpadSize(spm));
        }
        if self.dma_channels() == 0 {
            return Err(ConfigError::ChannelCount);
        }
        Ok(())
    }

    /// Load user configuration from ~/.config/streamrt/config.toml
    fn load_user_config() -> Option<Self> {
        let config_dir = dirs::config_dir()?;
        let config_path = config_dir.join("streamrt").join("config.toml");
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./streamrt.toml
    fn load_local_config() -> Option<Self> {
        // Try current directory
        let local_path = Path::new("streamrt.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        // Try to find project root by looking for Cargo.toml
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("streamrt.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.scratchpad_bytes.is_some() {
            self.scratchpad_bytes = other.scratchpad_bytes;
        }
        if other.replicas.is_some() {
            self.replicas = other.replicas;
        }
        if other.dma_channels.is_some() {
            self.dma_channels = other.dma_channels;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        for (var, slot) in [
            ("STREAMRT_SCRATCHPAD_BYTES", &mut self.scratchpad_bytes),
            ("STREAMRT_REPLICAS", &mut self.replicas),
            ("STREAMRT_DMA_CHANNELS", &mut self.dma_channels),
        ] {
            if let Ok(raw) = std::env::var(var) {
                match raw.parse::<usize>() {
                    Ok(value) => {
                        log::info!("Using {} from environment: {}", var, value);
                        *slot = Some(value);
                    }
                    Err(e) => log::warn!("Ignoring {}={:?}: {}", var, raw, e),
                }
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("streamrt").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# streamrt configuration
# Place this file at ~/.config/streamrt/config.toml or ./streamrt.toml

# Scratchpad bytes per cluster replica (default 131072)
scratchpad_bytes = 131072

# Number of cluster replicas (default 4, maximum 8)
replicas = 4

# Transfer-engine channels (default 2)
dma_channels = 2
"#
        .to_string()
    }
}
