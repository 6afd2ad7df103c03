//! PostgreSQL configuration

use faixa_core::config::LayeredConfig;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// PostgreSQL connection and behavior configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Connection pool configuration
    pub pool: PoolConfig,
    /// Migration configuration
    pub migrations: MigrationConfig,
    /// Upper bound for a single commit or rollback
    pub transaction_timeout: Duration,
}

impl PostgresConfig {
    /// Load configuration from environment variables
    ///
    /// Requires DATABASE_URL environment variable to be set.
    /// Other settings use defaults if not specified.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::Missing("DATABASE_URL".to_string()))?;
        Self::new(database_url)
    }

    /// Take the database URL from the layered configuration
    pub fn from_layered(config: &LayeredConfig) -> Result<Self, ConfigError> {
        let database_url = config.database_url.value.clone().ok_or_else(|| {
            ConfigError::Missing(
                "database.url (set FAIXA_DATABASE_URL, DATABASE_URL or [database] url)".to_string(),
            )
        })?;
        Self::new(database_url)
    }

    /// Create a new configuration with the given database URL
    pub fn new(database_url: String) -> Result<Self, ConfigError> {
        let config = Self {
            database_url,
            pool: PoolConfig::default(),
            migrations: MigrationConfig::default(),
            transaction_timeout: Duration::from_secs(30),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "database_url".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }

        if !self.database_url.starts_with("postgres://") && !self.database_url.starts_with("postgresql://")
        {
            return Err(ConfigError::Invalid {
                key: "database_url".to_string(),
                reason: "expected a postgres:// or postgresql:// URL".to_string(),
            });
        }

        if self.transaction_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "transaction_timeout".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        self.pool.validate()?;

        Ok(())
    }
}

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Maximum number of connections allowed
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool
    pub acquire_timeout: Duration,
    /// Timeout for idle connections before they are closed
    pub idle_timeout: Duration,
    /// Maximum lifetime of a connection
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_connections > self.max_connections {
            return Err(ConfigError::Invalid {
                key: "pool.min_connections".to_string(),
                reason: format!(
                    "min_connections ({}) cannot be greater than max_connections ({})",
                    self.min_connections, self.max_connections
                ),
            });
        }

        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "pool.max_connections".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Migration configuration
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Whether to run pending migrations when the store connects
    pub auto_run: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self { auto_run: true }
    }
}
