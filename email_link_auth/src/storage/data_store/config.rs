//! Data store connection configuration

use std::{env, str::FromStr, sync::Arc};

use super::types::{DataStore, PostgresDataStore, SqliteDataStore};
use crate::storage::errors::StorageError;

/// Connect lazily to the store named by `store_type` (`sqlite` or `postgres`).
pub fn connect_data_store(
    store_type: &str,
    store_url: &str,
) -> Result<Arc<dyn DataStore>, StorageError> {
    tracing::info!(
        "Initializing data store with type: {}, url: {}",
        store_type,
        store_url
    );

    let store: Arc<dyn DataStore> = match store_type {
        "sqlite" => {
            let opts = sqlx::sqlite::SqliteConnectOptions::from_str(store_url)
                .map_err(|e| {
                    StorageError::Storage(format!("Failed to parse SQLite connection string: {e}"))
                })?
                .create_if_missing(true);

            Arc::new(SqliteDataStore {
                pool: sqlx::sqlite::SqlitePool::connect_lazy_with(opts),
            })
        }
        "postgres" => Arc::new(PostgresDataStore {
            pool: sqlx::PgPool::connect_lazy(store_url).map_err(|e| {
                StorageError::Storage(format!("Failed to create Postgres pool: {e}"))
            })?,
        }),
        t => {
            return Err(StorageError::Storage(format!(
                "Unsupported store type: {t}. Supported types are 'sqlite' and 'postgres'"
            )));
        }
    };

    tracing::info!(
        "Connected to database: type={}, url={}",
        store_type,
        store_url
    );

    Ok(store)
}

/// Connect to the store described by `GENERIC_DATA_STORE_TYPE` and
/// `GENERIC_DATA_STORE_URL`.
pub fn data_store_from_env() -> Result<Arc<dyn DataStore>, StorageError> {
    let store_type = env::var("GENERIC_DATA_STORE_TYPE").map_err(|_| {
        StorageError::Storage("GENERIC_DATA_STORE_TYPE must be set".to_string())
    })?;
    let store_url = env::var("GENERIC_DATA_STORE_URL")
        .map_err(|_| StorageError::Storage("GENERIC_DATA_STORE_URL must be set".to_string()))?;

    connect_data_store(&store_type, &store_url)
}
