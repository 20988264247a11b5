//! Configuration settings for booking-outbox.
//!
//! Settings are loaded from `~/.booking-outbox/config.yaml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::config::Paths;
use crate::error::OutboxError;
use crate::features::sync::RetryPolicy;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Remote write API settings.
    pub remote: RemoteConfig,
    /// Sync processor settings.
    pub sync: SyncConfig,
    /// Connectivity monitor settings.
    pub network: NetworkConfig,
    /// Draft auto-save settings.
    pub drafts: DraftConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    /// Color output setting.
    #[serde(default = "default_color")]
    pub color: ColorSetting,
}

/// Color output setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorSetting {
    /// Auto-detect based on terminal.
    #[default]
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

impl ColorSetting {
    /// Apply this setting to the global `colored` switch.
    pub fn apply(self) {
        match self {
            Self::Auto => colored::control::unset_override(),
            Self::Always => colored::control::set_override(true),
            Self::Never => colored::control::set_override(false),
        }
    }
}

/// Remote write API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the booking service.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Sync processor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Attempts allowed before an operation fails terminally.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff delay after the first failure, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter as a fraction of the delay (0.0 - 1.0).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// Completed operations older than this are pruned.
    #[serde(default = "default_retention_hours")]
    pub completed_retention_hours: u32,
}

/// Connectivity monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// How long a connectivity change must hold before it is published.
    #[serde(default = "default_network_debounce_ms")]
    pub debounce_ms: u64,
}

/// Draft auto-save settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    /// Inactivity before an edit is written, in milliseconds.
    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u64,
    /// Drafts older than this are discarded without prompting.
    #[serde(default = "default_draft_max_age_hours")]
    pub max_age_hours: u32,
}

// Default value functions for serde
const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

const fn default_color() -> ColorSetting {
    ColorSetting::Auto
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

const fn default_timeout_secs() -> u64 {
    15
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

const fn default_jitter_factor() -> f64 {
    0.3
}

const fn default_retention_hours() -> u32 {
    72
}

const fn default_network_debounce_ms() -> u64 {
    500
}

const fn default_autosave_debounce_ms() -> u64 {
    1_000
}

const fn default_draft_max_age_hours() -> u32 {
    24
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
            color: default_color(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// Request timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
            completed_retention_hours: default_retention_hours(),
        }
    }
}

impl SyncConfig {
    /// Build the retry policy described by these settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cap is zero or the delays are inverted.
    pub fn retry_policy(&self) -> Result<RetryPolicy, OutboxError> {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .map(|policy| policy.with_jitter_factor(self.jitter_factor))
    }

    /// How long completed operations are kept for display.
    #[must_use]
    pub fn completed_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.completed_retention_hours))
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_network_debounce_ms(),
        }
    }
}

impl NetworkConfig {
    /// Debounce window as a `Duration`.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: default_autosave_debounce_ms(),
            max_age_hours: default_draft_max_age_hours(),
        }
    }
}

impl DraftConfig {
    /// Auto-save debounce as a `Duration`.
    #[must_use]
    pub const fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    /// Maximum draft age as a `chrono::Duration`.
    #[must_use]
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.max_age_hours))
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, OutboxError> {
        let paths = Paths::new()?;
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, OutboxError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            OutboxError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            OutboxError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check settings that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first offending field.
    pub fn validate(&self) -> Result<(), OutboxError> {
        if self.sync.completed_retention_hours == 0 {
            return Err(OutboxError::Config(
                "sync.completed_retention_hours must be at least 1".to_string(),
            ));
        }
        if self.drafts.max_age_hours == 0 {
            return Err(OutboxError::Config(
                "drafts.max_age_hours must be at least 1".to_string(),
            ));
        }

        self.sync.retry_policy().map(|_| ())
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), OutboxError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| OutboxError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            OutboxError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}
