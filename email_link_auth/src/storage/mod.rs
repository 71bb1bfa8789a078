mod config;
mod data_store;
mod errors;
mod schema_validation;

pub use config::TableNames;
pub use data_store::{
    DataStore, PostgresDataStore, SqliteDataStore, connect_data_store, data_store_from_env,
};
pub use errors::StorageError;

pub(crate) use errors::map_sqlx_error;
pub(crate) use schema_validation::{validate_postgres_table_schema, validate_sqlite_table_schema};
