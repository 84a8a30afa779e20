//! Daemon configuration.

use serde::{Deserialize, Serialize};
use updown_engine::EngineConfig;

use crate::error::{AppError, AppResult};

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Interval between settlement summaries in the log (seconds).
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_interval_secs() -> u64 {
    3_600
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// Event journal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Append engine events to daily JSON Lines files.
    #[serde(default = "default_journal_enabled")]
    pub enabled: bool,
    /// Output directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Events buffered before a write.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_journal_enabled() -> bool {
    true
}

fn default_data_dir() -> String {
    "data/events".to_string()
}

fn default_buffer_size() -> usize {
    64
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: default_journal_enabled(),
            data_dir: default_data_dir(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.engine
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        if self.journal.enabled && self.journal.buffer_size == 0 {
            return Err(AppError::Config(
                "journal.buffer_size must be positive".to_string(),
            ));
        }
        if self.telemetry.stats_interval_secs == 0 {
            return Err(AppError::Config(
                "telemetry.stats_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
