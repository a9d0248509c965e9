//! Application settings.
//!
//! Loaded from TOML; every field has a default so partial files work.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::recovery::DEFAULT_ERROR_LOG_CAPACITY;
use crate::workflow::WorkflowConfig;

/// Application settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// General settings
    pub general: GeneralSettings,

    /// Persistence and auto-save
    pub persistence: PersistenceSettings,

    /// Error classification
    pub recovery: RecoverySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Where workflow state is stored. Defaults to the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Log filter used when `-v` is not given.
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    pub auto_save: bool,
    pub auto_save_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Classified errors kept in memory.
    pub error_log_capacity: usize,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self { data_dir: None, log_level: "warn".to_string() }
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self { auto_save: true, auto_save_interval_ms: 5000, max_retries: 3, retry_delay_ms: 1000 }
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self { error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY }
    }
}

impl Settings {
    /// Load settings.
    ///
    /// Looks for settings in:
    /// 1. `.stepwise.toml` in current directory
    /// 2. `~/.config/stepwise/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local = PathBuf::from(".stepwise.toml");
        if local.exists() {
            return Self::load_from_file(&local);
        }

        if let Some(dir) = Self::config_dir() {
            let global = dir.join("config.toml");
            if global.exists() {
                return Self::load_from_file(&global);
            }
        }

        Ok(Self::default())
    }

    /// Load settings from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Settings directory.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("stepwise"))
    }

    /// Directory holding persisted workflow state.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.general.data_dir.clone().or_else(|| dirs::data_dir().map(|d| d.join("stepwise")))
    }

    /// Overlay the persistence settings onto an engine configuration.
    pub fn apply_to(&self, mut config: WorkflowConfig) -> WorkflowConfig {
        config.auto_save = self.persistence.auto_save;
        config.auto_save_interval = Duration::from_millis(self.persistence.auto_save_interval_ms);
        config.max_retries = self.persistence.max_retries;
        config.retry_delay = Duration::from_millis(self.persistence.retry_delay_ms);
        config
    }
}
