//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml
//! structure. Secrets and operational overrides come from the environment
//! (`.env` via dotenvy, `SCF_*` variables); the file carries the durable
//! tuning. A malformed file is fatal at startup; malformed runtime env
//! overrides fall back to the last-known-good thresholds inside the engine.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::strategy::{ThresholdConfig, ThresholdError};

/// Main configuration structure matching config.toml.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorSection,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Scheduler and ingestion tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorSection {
    /// Tick cadence in seconds (SCF_DETECTOR_POLL_SEC overrides).
    #[serde(default = "default_poll_secs")]
    pub poll_secs: f64,
    /// Evict a pool's rolling state after this long without events.
    #[serde(default = "default_inactivity_horizon_secs")]
    pub inactivity_horizon_secs: u64,
    /// Slot lag absorbed by the per-pool reorder buffer.
    #[serde(default = "default_reorder_lag_slots")]
    pub reorder_lag_slots: u64,
    /// Events the reorder buffer may hold before forcing release.
    #[serde(default = "default_reorder_max_pending")]
    pub reorder_max_pending: usize,
    /// Emit a health heartbeat line every N ticks.
    #[serde(default = "default_heartbeat_ticks")]
    pub heartbeat_ticks: u64,
    /// Grace period for in-flight pool passes on shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// JSON array of prior-winner wallet addresses.
    #[serde(default)]
    pub prior_winners_path: Option<PathBuf>,
    /// JSON map of wallet behavioral profiles.
    #[serde(default)]
    pub wallet_profiles_path: Option<PathBuf>,
}

fn default_poll_secs() -> f64 {
    2.0
}
fn default_inactivity_horizon_secs() -> u64 {
    86_400
}
fn default_reorder_lag_slots() -> u64 {
    8
}
fn default_reorder_max_pending() -> usize {
    64
}
fn default_heartbeat_ticks() -> u64 {
    30
}
fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            inactivity_horizon_secs: default_inactivity_horizon_secs(),
            reorder_lag_slots: default_reorder_lag_slots(),
            reorder_max_pending: default_reorder_max_pending(),
            heartbeat_ticks: default_heartbeat_ticks(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            prior_winners_path: None,
            wallet_profiles_path: None,
        }
    }
}

/// Persistence adapter selection.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Directory for file-backed stores.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Mirror snapshots/signals to JSONL files under data_dir.
    #[serde(default)]
    pub persist_files: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persist_files: false,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Configuration errors. Fatal at startup; at runtime the engine keeps its
/// last-known-good thresholds instead.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Thresholds(#[from] ThresholdError),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Load configuration from a TOML file, then apply environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// Defaults plus environment overrides, for running without a file.
pub fn default_config() -> Result<Config, ConfigError> {
    let mut config = Config::default();
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(raw) = std::env::var("SCF_DETECTOR_POLL_SEC") {
            self.detector.poll_secs = raw.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("SCF_DETECTOR_POLL_SEC not a number: {raw:?}"))
            })?;
        }
        self.thresholds = self.thresholds.with_env_overrides()?;
        Ok(())
    }

    /// Validate all configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detector.poll_secs <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "poll_secs must be > 0, got {}",
                self.detector.poll_secs
            )));
        }
        if self.detector.inactivity_horizon_secs == 0 {
            return Err(ConfigError::Validation(
                "inactivity_horizon_secs must be > 0".into(),
            ));
        }
        if self.detector.reorder_max_pending == 0 {
            return Err(ConfigError::Validation(
                "reorder_max_pending must be > 0".into(),
            ));
        }
        self.thresholds.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [detector]
            poll_secs = 5.0
            heartbeat_ticks = 10

            [thresholds]
            vc_max = 0.5
            cooldown_secs = 120

            [storage]
            data_dir = "out"
            persist_files = true

            [logging]
            level = "debug"
            "#
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.detector.poll_secs, 5.0);
        assert_eq!(cfg.thresholds.vc_max, 0.5);
        assert_eq!(cfg.thresholds.cooldown_secs, 120);
        assert!(cfg.storage.persist_files);
        assert_eq!(cfg.logging.level, "debug");
        // Sections not mentioned keep defaults.
        assert_eq!(cfg.detector.inactivity_horizon_secs, 86_400);
    }

    #[test]
    fn missing_sections_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[detector]\npoll_secs = 1.0\n").unwrap();
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.thresholds.cooldown_secs, 300);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bad_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[detector]\npoll_secs = -1.0\n").unwrap();
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Validation(_))
        ));

        let mut file2 = tempfile::NamedTempFile::new().unwrap();
        write!(file2, "[thresholds]\nvc_max = 0.0\n").unwrap();
        assert!(load_config(file2.path()).is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not toml at all [[[").unwrap();
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
