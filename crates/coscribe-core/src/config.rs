//! Engine tunables.

use crate::timer::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Every knob of the line-state engine. Missing JSON fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of layers; valid layers are `0..max_layers`.
    pub max_layers: usize,
    /// Minimum spacing between kept points when a stroke is simplified.
    pub simplify_epsilon: f64,
    /// Half window of the moving-average smoothing pass.
    pub smoothing_radius: usize,
    /// Gate for outbound cursor updates and batched delete flushes.
    pub broadcast_interval_ms: u64,
    /// Period after which all tombstones are cleared.
    pub tombstone_ttl_ms: u64,
    /// Fraction of the remaining distance the render camera covers per tick.
    pub camera_smoothing: f64,
    pub camera_settle_distance: f64,
    pub camera_settle_zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Keyboard zoom increment.
    pub zoom_step: f64,
    pub default_thickness: f64,
    pub default_color: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_layers: 3,
            simplify_epsilon: 0.5,
            smoothing_radius: 1,
            broadcast_interval_ms: 45,
            tombstone_ttl_ms: 10_000,
            camera_smoothing: 0.1,
            camera_settle_distance: 0.1,
            camera_settle_zoom: 0.01,
            min_zoom: 0.5,
            max_zoom: 2.0,
            zoom_step: 0.2,
            default_thickness: 4.0,
            default_color: "black".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.max_layers == 0 {
            return invalid("max_layers must be at least 1");
        }
        if !(self.simplify_epsilon >= 0.0) {
            return invalid("simplify_epsilon must be non-negative");
        }
        if !(self.camera_smoothing > 0.0 && self.camera_smoothing <= 1.0) {
            return invalid("camera_smoothing must be in (0, 1]");
        }
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom) {
            return invalid("zoom range must satisfy 0 < min_zoom <= max_zoom");
        }
        if self.broadcast_interval_ms == 0 || self.tombstone_ttl_ms == 0 {
            return invalid("intervals must be non-zero");
        }
        if !(self.default_thickness > 0.0) {
            return invalid("default_thickness must be positive");
        }
        Ok(())
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn tombstone_ttl(&self) -> Duration {
        Duration::from_millis(self.tombstone_ttl_ms)
    }
}
