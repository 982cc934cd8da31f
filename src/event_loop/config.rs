//! Event loop configuration

use crate::error::{messages, Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tuning knobs for [`EventLoop`](super::EventLoop)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Maximum tasks drained in a single tick (starvation protection)
    pub max_tasks_per_tick: usize,
    /// Maximum ticks `run_to_completion` runs before giving up (0 = unlimited)
    pub max_ticks: u64,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_tick: 10_000,
            max_ticks: 0,
        }
    }
}

impl EventLoopConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InternalError(format!("Failed to serialize config: {}", e)))
    }

    /// Reject configurations the loop cannot make progress with
    pub fn validate(&self) -> Result<()> {
        if self.max_tasks_per_tick == 0 {
            return Err(Error::config(messages::must_be_positive("max_tasks_per_tick")));
        }
        Ok(())
    }
}
