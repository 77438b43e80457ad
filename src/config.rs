//! Configuration management for srtc-publish
//!
//! Runtime options for the callback delivery thread, negotiation policy and
//! logging, stored as TOML.

use crate::errors::RtcError;
use crate::types::MAX_SIMULCAST_LAYERS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrtcConfig {
    pub delivery: DeliveryConfig,
    pub negotiation: NegotiationConfig,
    pub logging: LoggingConfig,
}

/// Callback delivery thread settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Name of the per-session delivery thread
    pub thread_name: String,
    /// Stats snapshots buffered before new ones are dropped
    pub stats_queue_capacity: usize,
    /// How long dropping a session waits for pending callbacks, in milliseconds
    pub shutdown_timeout_ms: u64,
}

/// Negotiation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Simulcast layers accepted per offer (1-3)
    pub max_simulcast_layers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `env_logger` filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for SrtcConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryConfig {
                thread_name: "srtc-callbacks".to_string(),
                stats_queue_capacity: 16,
                shutdown_timeout_ms: 500,
            },
            negotiation: NegotiationConfig {
                max_simulcast_layers: MAX_SIMULCAST_LAYERS,
            },
            logging: LoggingConfig {
                default_filter: "srtc_publish=info".to_string(),
            },
        }
    }
}

impl SrtcConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RtcError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            RtcError::configuration(format!("Failed to read config file: {}", e))
        })?;

        let config: SrtcConfig = toml::from_str(&contents).map_err(|e| {
            RtcError::configuration(format!("Failed to parse config file: {}", e))
        })?;

        config.validate().map_err(RtcError::configuration)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RtcError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RtcError::configuration(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            RtcError::configuration(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            RtcError::configuration(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("srtc.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.delivery.thread_name.trim().is_empty() {
            return Err("Delivery thread name must not be empty".to_string());
        }
        if self.delivery.stats_queue_capacity == 0 || self.delivery.stats_queue_capacity > 1024 {
            return Err("Stats queue capacity must be between 1 and 1024".to_string());
        }

        if self.negotiation.max_simulcast_layers == 0
            || self.negotiation.max_simulcast_layers > MAX_SIMULCAST_LAYERS
        {
            return Err(format!(
                "Max simulcast layers must be between 1 and {}",
                MAX_SIMULCAST_LAYERS
            ));
        }

        if self.logging.default_filter.trim().is_empty() {
            return Err("Default log filter must not be empty".to_string());
        }

        Ok(())
    }
}
