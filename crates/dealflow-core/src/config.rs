use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DealflowError, Result};

/// Top-level configuration for the Dealflow engine.
///
/// Loaded from `~/.dealflow/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DealflowConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DealflowConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DealflowConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| DealflowError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.dealflow/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Plan execution engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on a single step's data-store or groupware call, in
    /// seconds. A timed-out step fails the plan like any other step error.
    pub step_timeout_seconds: u64,
    /// Jaro-Winkler score at or above which a candidate is reported at all.
    pub duplicate_low_threshold: f64,
    /// Score at or above which similarity is reported as "medium".
    pub duplicate_medium_threshold: f64,
    /// Score at or above which similarity is reported as "high".
    pub duplicate_high_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_seconds: 30,
            duplicate_low_threshold: 0.80,
            duplicate_medium_threshold: 0.87,
            duplicate_high_threshold: 0.93,
        }
    }
}
