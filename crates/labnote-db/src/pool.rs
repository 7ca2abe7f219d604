//! Database connection pool management.

use std::time::{Duration, Instant};

use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool};
use sqlx::pool::PoolOptions;
use sqlx::postgres::{PgPool, Postgres};
use tracing::info;

use labnote_core::{defaults, Error, Result};

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Idle connection timeout duration.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::DB_MAX_CONNECTIONS,
            min_connections: 0,
            connect_timeout: Duration::from_secs(defaults::DB_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn options<DB: sqlx::Database>(&self) -> PoolOptions<DB> {
        PoolOptions::<DB>::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout)
    }
}

/// Create a PostgreSQL connection pool.
pub async fn create_pg_pool(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    log_create("postgres", &config);

    let pool = config
        .options::<Postgres>()
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    log_established("postgres", pool.size(), start);
    Ok(pool)
}

/// Create a MySQL connection pool.
pub async fn create_mysql_pool(database_url: &str, config: PoolConfig) -> Result<MySqlPool> {
    let options = database_url
        .parse::<MySqlConnectOptions>()
        .map_err(Error::Database)?;
    create_mysql_pool_with(options, config).await
}

/// Create a MySQL connection pool from parsed connect options.
pub async fn create_mysql_pool_with(
    options: MySqlConnectOptions,
    config: PoolConfig,
) -> Result<MySqlPool> {
    let start = Instant::now();
    log_create("mysql", &config);

    let pool = config
        .options::<MySql>()
        .connect_with(options)
        .await
        .map_err(Error::Database)?;

    log_established("mysql", pool.size(), start);
    Ok(pool)
}

fn log_create(engine: &str, config: &PoolConfig) {
    info!(
        subsystem = "db",
        component = "pool",
        op = "create",
        engine,
        max_connections = config.max_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        "Creating database connection pool"
    );
}

fn log_established(engine: &str, size: u32, start: Instant) {
    info!(
        subsystem = "db",
        component = "pool",
        op = "established",
        engine,
        pool_size = size,
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, defaults::DB_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, 0);
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .max_connections(2)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(5));

        assert_eq!(config.max_connections, 2);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }
}
