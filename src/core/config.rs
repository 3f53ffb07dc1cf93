//! Configuration - Type-safe, validated config
//!
//! Loads from `config.toml` at the project root. Fee constants are protocol
//! parameters and deliberately absent here (see `pricing`).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::{Address, Error, Result};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    #[serde(default)]
    pub app: AppConfig,

    /// Pool account and asset labelling
    #[serde(default)]
    pub pool: PoolConfig,

    /// Market creation rules
    #[serde(default)]
    pub market: MarketConfig,

    /// Store behaviour
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run mode: paper or live
    pub mode: RunMode,

    /// Log level
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Paper,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Paper,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Account every inbound leg must pay into
    pub account: Address,

    /// Asset unit label prefix ("xmp" gives "xmp-YES" / "xmp-NO")
    #[serde(default = "default_unit_prefix")]
    pub unit_prefix: String,
}

fn default_unit_prefix() -> String {
    "xmp".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            account: Address::new("POOL"),
            unit_prefix: default_unit_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Minimum hours between expiry and resolution
    #[serde(default = "default_resolution_gap")]
    pub min_resolution_gap_hours: i64,

    /// Minimum collateral a creator must commit
    #[serde(default)]
    pub min_collateral: rust_decimal::Decimal,
}

fn default_resolution_gap() -> i64 {
    24
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            min_resolution_gap_hours: default_resolution_gap(),
            min_collateral: rust_decimal::Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Optimistic retries before `run_atomic` gives up
    #[serde(default = "default_max_retries")]
    pub max_atomic_retries: u32,
}

fn default_max_retries() -> u32 {
    8
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_atomic_retries: default_max_retries(),
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location (project root config.toml).
    pub fn load_default() -> Self {
        let candidates = [
            "config.toml",
            concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml"),
        ];

        for path in &candidates {
            match Self::load(Path::new(path)) {
                Ok(cfg) => {
                    tracing::info!("Loaded config from {}", path);
                    return cfg;
                }
                Err(e) => tracing::debug!("Skipping {}: {}", path, e),
            }
        }

        tracing::warn!("No config.toml found, using defaults");
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.account.as_str().is_empty() {
            return Err(Error::Config("pool.account must not be empty".into()));
        }
        if self.market.min_resolution_gap_hours < 0 {
            return Err(Error::Config(
                "market.min_resolution_gap_hours must not be negative".into(),
            ));
        }
        if chrono::Duration::try_hours(self.market.min_resolution_gap_hours).is_none() {
            return Err(Error::Config(
                "market.min_resolution_gap_hours is out of range".into(),
            ));
        }
        if self.store.max_atomic_retries == 0 {
            return Err(Error::Config("store.max_atomic_retries must be at least 1".into()));
        }
        Ok(())
    }
}
