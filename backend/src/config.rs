//! Configuration management for the stock ledger server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides, e.g. `LEDGER__DATABASE__URL`

use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT verification configuration
    pub jwt: JwtConfig,

    /// Ledger engine tuning
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret used to verify bearer tokens issued by the auth service
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Upper bound on one movement unit of work, in milliseconds
    pub unit_timeout_ms: u64,

    /// Extra attempts after a storage-level conflict
    pub conflict_retries: u32,

    /// Row cap for unpaginated reports
    pub report_row_cap: i64,

    /// Minimum threshold given to lazily created levels
    pub default_min_stock_level: i32,

    /// Maximum threshold given to lazily created levels
    pub default_max_stock_level: Option<i32>,
}

impl LedgerConfig {
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_millis(self.unit_timeout_ms)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            unit_timeout_ms: 5_000,
            conflict_retries: 1,
            report_row_cap: 1_000,
            default_min_stock_level: 0,
            default_max_stock_level: None,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("LEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let ledger = LedgerConfig::default();

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 8080)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("ledger.unit_timeout_ms", ledger.unit_timeout_ms as i64)?
            .set_default("ledger.conflict_retries", i64::from(ledger.conflict_retries))?
            .set_default("ledger.report_row_cap", ledger.report_row_cap)?
            .set_default("ledger.default_min_stock_level", i64::from(ledger.default_min_stock_level))?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (LEDGER__SECTION__KEY)
            .add_source(
                Environment::with_prefix("LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Socket address string the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_defaults() {
        let ledger = LedgerConfig::default();
        assert_eq!(ledger.conflict_retries, 1);
        assert_eq!(ledger.report_row_cap, 1_000);
        assert_eq!(ledger.unit_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_bind_address() {
        let config = Config {
            environment: "test".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/ledger".to_string(),
                max_connections: 1,
                min_connections: 1,
                acquire_timeout_secs: 1,
            },
            jwt: JwtConfig {
                secret: "secret".to_string(),
            },
            ledger: LedgerConfig::default(),
        };
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }
}
