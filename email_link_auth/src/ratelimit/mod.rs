//! Per-IP throttle on link requests
//!
//! Each (login session number, IP) pair owns one counter. The upper bound is
//! a CHECK constraint on the counter column, so an admit that would exceed it
//! fails inside the database and concurrent admits can never overshoot.

mod postgres;
mod sqlite;

use std::sync::Arc;

use crate::cancel::Cancellation;
use crate::storage::{DataStore, StorageError, TableNames};

use postgres::*;
use sqlite::*;

#[derive(Clone)]
pub(crate) struct RateLimiter {
    store: Arc<dyn DataStore>,
    table: String,
    max_attempts: i64,
}

impl RateLimiter {
    pub(crate) fn new(store: Arc<dyn DataStore>, tables: TableNames, max_attempts: i64) -> Self {
        Self {
            store,
            table: tables.sign_ins_per_ip,
            max_attempts,
        }
    }

    /// Create the counter table. The configured maximum is written into the
    /// CHECK constraint when the table is first created.
    pub(crate) async fn init(&self) -> Result<(), StorageError> {
        match (self.store.as_sqlite(), self.store.as_postgres()) {
            (Some(pool), _) => {
                create_table_sqlite(pool, &self.table, self.max_attempts).await?;
                validate_table_sqlite(pool, &self.table).await
            }
            (_, Some(pool)) => {
                create_table_postgres(pool, &self.table, self.max_attempts).await?;
                validate_table_postgres(pool, &self.table).await
            }
            _ => Err(StorageError::Storage("Unsupported database type".to_string())),
        }
    }

    /// Count one more link request from `ip`. Fails with
    /// [`StorageError::ConstraintViolation`] once the window is exhausted.
    #[tracing::instrument(skip(self, cancel))]
    pub(crate) async fn admit(
        &self,
        cancel: &Cancellation,
        ip: &str,
        login_session_number: i64,
    ) -> Result<i64, StorageError> {
        cancel.check()?;

        let result = if let Some(pool) = self.store.as_sqlite() {
            admit_sqlite(pool, &self.table, ip, login_session_number).await
        } else if let Some(pool) = self.store.as_postgres() {
            admit_postgres(pool, &self.table, ip, login_session_number).await
        } else {
            Err(StorageError::Storage("Unsupported database type".to_string()))
        };

        if let Err(StorageError::ConstraintViolation(_)) = &result {
            tracing::warn!(
                ip,
                login_session_number,
                max_attempts = self.max_attempts,
                "Link request rejected: per-IP limit reached"
            );
        }
        result
    }

    /// Give back one attempt; the counter never drops below zero
    #[tracing::instrument(skip(self, cancel))]
    pub(crate) async fn refund(
        &self,
        cancel: &Cancellation,
        ip: &str,
        login_session_number: i64,
    ) -> Result<(), StorageError> {
        cancel.check()?;

        if let Some(pool) = self.store.as_sqlite() {
            refund_sqlite(pool, &self.table, ip, login_session_number).await
        } else if let Some(pool) = self.store.as_postgres() {
            refund_postgres(pool, &self.table, ip, login_session_number).await
        } else {
            Err(StorageError::Storage("Unsupported database type".to_string()))
        }
    }

    #[cfg(test)]
    pub(crate) async fn attempts(
        &self,
        cancel: &Cancellation,
        ip: &str,
        login_session_number: i64,
    ) -> Result<i64, StorageError> {
        cancel.check()?;

        let count = if let Some(pool) = self.store.as_sqlite() {
            attempts_sqlite(pool, &self.table, ip, login_session_number).await?
        } else if let Some(pool) = self.store.as_postgres() {
            attempts_postgres(pool, &self.table, ip, login_session_number).await?
        } else {
            return Err(StorageError::Storage("Unsupported database type".to_string()));
        };

        Ok(count.unwrap_or(0))
    }
}
