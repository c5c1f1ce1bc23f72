//! Guard configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the payment guard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// How long a writer waits on the reservation database lock before
    /// giving up (and therefore failing closed)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl GuardConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
