//! Application configuration
//!
//! Centralized configuration management using the `config` crate, loaded
//! from defaults, optional config files and environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChargingConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub actions: ActionsConfig,
}

/// Engine startup configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineConfig {
    /// Optional path to a JSON bootstrap document with tariff and account
    /// data to seed the in-memory stores at startup
    #[serde(default)]
    pub bootstrap_path: Option<String>,
}

/// Scheduler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Delay applied when materializing an `*asap` start time
    #[serde(default = "default_asap_delay")]
    pub asap_delay_secs: u64,
}

fn default_asap_delay() -> u64 {
    10
}

/// Action execution configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ActionsConfig {
    /// Timeout for a single guarded per-account execution; expiry is a
    /// transaction failure for that account only
    #[serde(default = "default_guard_timeout")]
    pub guard_timeout_secs: u64,
}

fn default_guard_timeout() -> u64 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            asap_delay_secs: default_asap_delay(),
        }
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            guard_timeout_secs: default_guard_timeout(),
        }
    }
}

impl ChargingConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("scheduler.asap_delay_secs", default_asap_delay() as i64)?
            .set_default("actions.guard_timeout_secs", default_guard_timeout() as i64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("COBRO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("COBRO").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
