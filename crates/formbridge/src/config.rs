//! Bridge configuration, loadable from YAML.
//!
//! ```yaml
//! batch:
//!   enabled: true
//!   delay_ms: 16
//! log_filter: "formbridge=debug"
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default batch window: one frame at 60 Hz.
pub const DEFAULT_BATCH_DELAY_MS: u64 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub enabled: bool,
    pub delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: DEFAULT_BATCH_DELAY_MS,
        }
    }
}

impl BatchConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub batch: BatchConfig,
    /// Directive string for the tracing `EnvFilter`, used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
            .map_err(|e| anyhow::anyhow!("Failed to parse bridge config YAML: {}", e))
    }

    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e)
        })?;

        Self::from_yaml_str(&content).map_err(|e| anyhow::anyhow!("{} ({})", e, path.display()))
    }
}
