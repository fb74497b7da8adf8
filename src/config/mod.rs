//! Queue configuration loaded from JSON.
//!
//! Every field is optional. Threshold fields use `0` (or any non-positive
//! value) to mean "keep the built-in default", so the accessors return
//! `Option`s ready for [`TaskQueue::configure_thresholds`].
//!
//! [`TaskQueue::configure_thresholds`]: crate::background::TaskQueue::configure_thresholds

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Queue store address used when none is configured.
pub const DEFAULT_REDIS_ADDRESS: &str = "localhost:6379";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// `host:port` of the queue store.
    #[serde(default = "default_redis_address")]
    pub redis_address: String,

    #[serde(default)]
    pub verification_interval_minutes: i64,

    #[serde(default)]
    pub pending_transmutation_hours: i64,

    #[serde(default)]
    pub material_low_stock_threshold: f64,
}

fn default_redis_address() -> String {
    DEFAULT_REDIS_ADDRESS.to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_address: default_redis_address(),
            verification_interval_minutes: 0,
            pending_transmutation_hours: 0,
            material_low_stock_threshold: 0.0,
        }
    }
}

impl QueueConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads and parses the JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn verification_interval(&self) -> Option<Duration> {
        positive_duration(self.verification_interval_minutes, 60)
    }

    pub fn pending_age(&self) -> Option<Duration> {
        positive_duration(self.pending_transmutation_hours, 60 * 60)
    }

    pub fn low_stock_threshold(&self) -> Option<f64> {
        Some(self.material_low_stock_threshold).filter(|v| *v > 0.0)
    }
}

fn positive_duration(value: i64, unit_secs: u64) -> Option<Duration> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .map(|v| Duration::from_secs(v.saturating_mul(unit_secs)))
}
