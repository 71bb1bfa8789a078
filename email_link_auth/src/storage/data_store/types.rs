use sqlx::{Pool, Postgres, Sqlite};

/// Backend holding sign-in records, account metadata and IP counters.
///
/// Stores ask for the pool of the backend they run on; exactly one of the
/// accessors returns `Some`.
pub trait DataStore: Send + Sync {
    fn as_sqlite(&self) -> Option<&Pool<Sqlite>>;
    fn as_postgres(&self) -> Option<&Pool<Postgres>>;
}

#[derive(Clone, Debug)]
pub struct SqliteDataStore {
    pub(super) pool: sqlx::SqlitePool,
}

impl SqliteDataStore {
    /// Wrap an existing pool. For `sqlite::memory:` the pool must keep a
    /// single long-lived connection, since every connection is its own database.
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

impl DataStore for SqliteDataStore {
    fn as_sqlite(&self) -> Option<&Pool<Sqlite>> {
        Some(&self.pool)
    }

    fn as_postgres(&self) -> Option<&Pool<Postgres>> {
        None
    }
}

#[derive(Clone, Debug)]
pub struct PostgresDataStore {
    pub(super) pool: sqlx::PgPool,
}

impl PostgresDataStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

impl DataStore for PostgresDataStore {
    fn as_sqlite(&self) -> Option<&Pool<Sqlite>> {
        None
    }

    fn as_postgres(&self) -> Option<&Pool<Postgres>> {
        Some(&self.pool)
    }
}
