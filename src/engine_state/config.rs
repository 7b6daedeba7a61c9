//! # Engine Configuration
//!
//! Values the core consumes but does not own: world dimensions, seed, pool size and the
//! scheduler's drive rate. Loaded from JSON; every field is optional and falls back to its
//! default.
//!
//! ```rust
//! use voxel_world_engine::engine_state::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "seed": 7, "draw_chunks": 2 }"#).unwrap();
//! assert_eq!(config.seed, 7);
//! assert_eq!(config.chunk_size, 16);
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;
use web_time::Duration;

/// Tallest world whose heights still fit the compact per-block storage.
pub const MAX_WORLD_HEIGHT: i32 = 255;

/// Errors raised while loading or validating an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for this schema.
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is outside its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Voxels per chunk edge.
    pub chunk_size: i32,
    /// Vertical voxel extent of the world.
    pub world_height: i32,
    /// Seed for all noise and randomness.
    pub seed: u32,
    /// Maximum number of unloaded chunk handles kept for reuse.
    pub pool_limit: usize,
    /// Scheduler ticks per second.
    pub rate: f64,
    /// Chunks loaded around the viewpoint in each direction.
    pub draw_chunks: i32,
    /// Half-width of the neighbourhood sampled by lighting.
    pub lighting_radius: i32,
    /// Minimum milliseconds between two buffer syncs of one chunk.
    pub sync_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            chunk_size: 16,
            world_height: 24,
            seed: 123,
            pool_limit: 64,
            rate: 60.0,
            draw_chunks: 1,
            lighting_radius: 2,
            sync_interval_ms: 32,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks every value against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size <= 0 {
            return Err(ConfigError::Invalid(format!(
                "chunk_size must be positive, got {}",
                self.chunk_size
            )));
        }
        if self.world_height <= 0 || self.world_height > MAX_WORLD_HEIGHT {
            return Err(ConfigError::Invalid(format!(
                "world_height must be in 1..={}, got {}",
                MAX_WORLD_HEIGHT, self.world_height
            )));
        }
        let cells = i64::from(self.chunk_size).pow(2) * i64::from(self.world_height);
        if cells > i64::from(i32::MAX) {
            return Err(ConfigError::Invalid(format!(
                "a {0}x{1}x{0} chunk holds {2} cells, more than {3}",
                self.chunk_size,
                self.world_height,
                cells,
                i32::MAX
            )));
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "rate must be a positive number of ticks per second, got {}",
                self.rate
            )));
        }
        if self.lighting_radius < 0 {
            return Err(ConfigError::Invalid(format!(
                "lighting_radius must not be negative, got {}",
                self.lighting_radius
            )));
        }
        if self.draw_chunks < 0 {
            return Err(ConfigError::Invalid(format!(
                "draw_chunks must not be negative, got {}",
                self.draw_chunks
            )));
        }
        Ok(())
    }

    /// Minimum time between two buffer syncs of one chunk.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}
