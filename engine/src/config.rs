//! Configuration management for the Warehouse Picking Engine
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with WPE_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::strategy::AllocationOrder;

/// Main engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Current environment (development, production)
    pub environment: String,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Transaction retry configuration
    pub transaction: TransactionConfig,

    /// Picking behavior configuration
    pub picking: PickingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransactionConfig {
    /// Attempts before a transient conflict becomes a terminal failure
    pub max_attempts: u32,

    /// Base backoff between retry attempts, multiplied by the attempt number
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PickingConfig {
    /// Whether batch-aware reservation arithmetic is active
    pub batch_tracking: bool,

    /// Tie-break order used when several locations or batches could satisfy
    /// the same demand
    pub allocation_order: AllocationOrder,
}

impl EngineConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> EngineResult<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::build(env_overrides()).map_err(|e| EngineError::Configuration(e.to_string()))
    }

    fn build(overrides: Environment) -> Result<Self, ConfigError> {
        let environment = std::env::var("WPE_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("transaction.max_attempts", 3)?
            .set_default("transaction.retry_backoff_ms", 25)?
            .set_default("picking.batch_tracking", false)?
            .set_default("picking.allocation_order", "largest_stock_first")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(overrides)
            .build()?;

        config.try_deserialize()
    }
}

/// Environment variable overrides: `WPE_DATABASE__URL` maps to
/// `database.url`, one underscore after the prefix, two between nesting
/// levels.
fn env_overrides() -> Environment {
    Environment::with_prefix("WPE")
        .prefix_separator("_")
        .separator("__")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(vars: &[(&str, &str)]) -> Environment {
        // a fixed source map instead of mutating the process environment,
        // which other tests in this binary share
        env_overrides().source(Some(
            vars.iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        ))
    }

    #[test]
    fn defaults_apply_without_config_file() {
        // only the database URL has no default
        let config =
            EngineConfig::build(overrides(&[("WPE_DATABASE__URL", "postgres://localhost/test")]))
                .unwrap();
        assert_eq!(config.database.url, "postgres://localhost/test");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.transaction.max_attempts, 3);
        assert!(!config.picking.batch_tracking);
        assert_eq!(
            config.picking.allocation_order,
            AllocationOrder::LargestStockFirst
        );
    }

    #[test]
    fn single_prefix_underscore_and_double_nesting_separator() {
        let config = EngineConfig::build(overrides(&[
            ("WPE_DATABASE__URL", "postgres://localhost/test"),
            ("WPE_DATABASE__MAX_CONNECTIONS", "7"),
            ("WPE_PICKING__BATCH_TRACKING", "true"),
        ]))
        .unwrap();
        assert_eq!(config.database.max_connections, 7);
        assert!(config.picking.batch_tracking);
    }

    #[test]
    fn missing_database_url_is_rejected() {
        assert!(EngineConfig::build(overrides(&[])).is_err());
    }
}
