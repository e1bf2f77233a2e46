//! Configuration Module
//!
//! Loads and validates configuration from TOML files, with `SCF_*`
//! environment overrides on top.

pub mod loader;

pub use loader::{
    default_config, load_config, Config, ConfigError, DetectorSection, LoggingSection,
    StorageSection,
};
