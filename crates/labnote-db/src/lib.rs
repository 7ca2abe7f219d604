//! # labnote-db
//!
//! Relational storage adapters for labnote.
//!
//! Both adapters implement [`labnote_core::LabStore`]; the export pipeline
//! never learns which engine it talks to. Use [`connect`] to build the one a
//! [`DatabaseConfig`] asks for.

pub mod mysql;
pub mod pool;
pub mod postgres;
pub mod test_fixtures;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use labnote_core::{DatabaseConfig, DatabaseEngine, LabStore, Result};

pub use mysql::MySqlLabStore;
pub use pool::{create_mysql_pool, create_mysql_pool_with, create_pg_pool, PoolConfig};
pub use postgres::PgLabStore;

/// Open a pool for the configured engine and wrap it in the matching store.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn LabStore>> {
    config.validate()?;
    let pool_config = PoolConfig::new().max_connections(config.max_connections);

    let store: Arc<dyn LabStore> = match config.engine {
        DatabaseEngine::Postgres => {
            Arc::new(PgLabStore::new(create_pg_pool(&config.url, pool_config).await?))
        }
        DatabaseEngine::MySql => Arc::new(MySqlLabStore::new(
            create_mysql_pool(&config.url, pool_config).await?,
        )),
    };

    info!(
        subsystem = "db",
        op = "connect",
        engine = %config.engine,
        "Storage adapter ready"
    );
    Ok(store)
}

/// Candidates that do not appear in `existing`, sorted and deduplicated.
pub(crate) fn missing_from(candidates: &[i64], existing: &[i64]) -> Vec<i64> {
    let existing: BTreeSet<i64> = existing.iter().copied().collect();
    candidates
        .iter()
        .copied()
        .filter(|id| !existing.contains(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
