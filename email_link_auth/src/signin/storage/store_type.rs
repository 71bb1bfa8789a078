use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::cancel::Cancellation;
use crate::metadata::AccountMetadata;
use crate::storage::{DataStore, StorageError, TableNames};

use crate::signin::types::{Finalization, IpRefund, LoginId, NewSignIn, SignInRecord};

use super::postgres::*;
use super::sqlite::*;

/// Persistence for sign-in records and the account metadata written with them.
///
/// Every transition that must not be lost to a concurrent writer is a single
/// conditional write; a condition that no longer holds surfaces as
/// [`StorageError::NoRowsAffected`].
#[derive(Clone)]
pub(crate) struct SignInStore {
    store: Arc<dyn DataStore>,
    tables: TableNames,
}

impl SignInStore {
    pub(crate) fn new(store: Arc<dyn DataStore>, tables: TableNames) -> Self {
        Self { store, tables }
    }

    /// Create the sign-in and metadata tables, then check their columns
    pub(crate) async fn init(&self) -> Result<(), StorageError> {
        match (self.store.as_sqlite(), self.store.as_postgres()) {
            (Some(pool), _) => {
                create_tables_sqlite(pool, &self.tables).await?;
                validate_sign_in_tables_sqlite(pool, &self.tables).await?;
                Ok(())
            }
            (_, Some(pool)) => {
                create_tables_postgres(pool, &self.tables).await?;
                validate_sign_in_tables_postgres(pool, &self.tables).await?;
                Ok(())
            }
            _ => Err(StorageError::Storage("Unsupported database type".to_string())),
        }
    }

    /// Insert a fresh pending record or renew an existing one.
    ///
    /// Returns `Ok(None)` when the existing record is blocked and
    /// `blocked_until` has not yet passed; nothing is written in that case.
    #[tracing::instrument(skip(self, cancel, new), fields(id = %new.id), err)]
    pub(crate) async fn create_or_renew(
        &self,
        cancel: &Cancellation,
        new: &NewSignIn,
    ) -> Result<Option<SignInRecord>, StorageError> {
        cancel.check()?;

        if let Some(pool) = self.store.as_sqlite() {
            create_or_renew_sqlite(pool, &self.tables, new).await
        } else if let Some(pool) = self.store.as_postgres() {
            create_or_renew_postgres(pool, &self.tables, new).await
        } else {
            Err(StorageError::Storage("Unsupported database type".to_string()))
        }
    }

    #[tracing::instrument(skip(self, cancel), fields(id = %id))]
    pub(crate) async fn get(
        &self,
        cancel: &Cancellation,
        id: &LoginId,
    ) -> Result<SignInRecord, StorageError> {
        cancel.check()?;

        let record = if let Some(pool) = self.store.as_sqlite() {
            get_sign_in_sqlite(pool, &self.tables, id).await?
        } else if let Some(pool) = self.store.as_postgres() {
            get_sign_in_postgres(pool, &self.tables, id).await?
        } else {
            return Err(StorageError::Storage("Unsupported database type".to_string()));
        };

        record.ok_or_else(|| StorageError::NotFound(format!("sign-in {id}")))
    }

    /// Fetch the record only if its status-poll secret is still `otp`
    #[tracing::instrument(skip(self, cancel, otp), fields(id = %id))]
    pub(crate) async fn get_by_otp(
        &self,
        cancel: &Cancellation,
        id: &LoginId,
        otp: &str,
    ) -> Result<SignInRecord, StorageError> {
        cancel.check()?;

        let record = if let Some(pool) = self.store.as_sqlite() {
            get_sign_in_by_otp_sqlite(pool, &self.tables, id, otp).await?
        } else if let Some(pool) = self.store.as_postgres() {
            get_sign_in_by_otp_postgres(pool, &self.tables, id, otp).await?
        } else {
            return Err(StorageError::Storage("Unsupported database type".to_string()));
        };

        record.ok_or_else(|| StorageError::NotFound(format!("sign-in {id} with otp")))
    }

    pub(crate) async fn get_metadata(
        &self,
        cancel: &Cancellation,
        user_id: &str,
    ) -> Result<Option<AccountMetadata>, StorageError> {
        cancel.check()?;

        if let Some(pool) = self.store.as_sqlite() {
            get_metadata_sqlite(pool, &self.tables, user_id).await
        } else if let Some(pool) = self.store.as_postgres() {
            get_metadata_postgres(pool, &self.tables, user_id).await
        } else {
            Err(StorageError::Storage("Unsupported database type".to_string()))
        }
    }

    /// Bump the wrong-code counter by one, installing `blocked_until` when given
    #[tracing::instrument(skip(self, cancel), fields(id = %id))]
    pub(crate) async fn increase_wrong_attempts(
        &self,
        cancel: &Cancellation,
        id: &LoginId,
        blocked_until: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        cancel.check()?;

        if let Some(pool) = self.store.as_sqlite() {
            increase_wrong_attempts_sqlite(pool, &self.tables, id, blocked_until).await
        } else if let Some(pool) = self.store.as_postgres() {
            increase_wrong_attempts_postgres(pool, &self.tables, id, blocked_until).await
        } else {
            Err(StorageError::Storage("Unsupported database type".to_string()))
        }
    }

    /// Mark the record verified and advance its issued-token sequence, as
    /// long as it is still pending at `observed_seq`. The account metadata
    /// is stored in the same atomic write. Returns the new sequence.
    #[tracing::instrument(
        skip(self, cancel, fin),
        fields(id = %fin.id, observed_seq = fin.observed_seq),
        err
    )]
    pub(crate) async fn finalize(
        &self,
        cancel: &Cancellation,
        fin: &Finalization<'_>,
    ) -> Result<i64, StorageError> {
        cancel.check()?;

        if let Some(pool) = self.store.as_sqlite() {
            finalize_sqlite(pool, &self.tables, fin).await
        } else if let Some(pool) = self.store.as_postgres() {
            finalize_postgres(pool, &self.tables, fin).await
        } else {
            Err(StorageError::Storage("Unsupported database type".to_string()))
        }
    }

    /// Move a verified record at `issued_token_seq` to consumed and spend its
    /// status-poll secret, refunding the IP attempt in the same atomic write
    /// when `refund` is given.
    #[tracing::instrument(skip(self, cancel, confirmation_code, refund), fields(id = %id), err)]
    pub(crate) async fn consume(
        &self,
        cancel: &Cancellation,
        id: &LoginId,
        confirmation_code: &str,
        issued_token_seq: i64,
        refund: Option<IpRefund<'_>>,
    ) -> Result<(), StorageError> {
        cancel.check()?;

        if let Some(pool) = self.store.as_sqlite() {
            consume_sqlite(pool, &self.tables, id, confirmation_code, issued_token_seq, refund)
                .await
        } else if let Some(pool) = self.store.as_postgres() {
            consume_postgres(pool, &self.tables, id, confirmation_code, issued_token_seq, refund)
                .await
        } else {
            Err(StorageError::Storage("Unsupported database type".to_string()))
        }
    }

    /// Clear the status-poll secret and mark the record consumed, provided
    /// it is still verified at the sequence the caller read
    #[tracing::instrument(skip(self, cancel, otp), fields(id = %id), err)]
    pub(crate) async fn redeem_otp(
        &self,
        cancel: &Cancellation,
        id: &LoginId,
        otp: &str,
        issued_token_seq: i64,
    ) -> Result<(), StorageError> {
        cancel.check()?;

        if let Some(pool) = self.store.as_sqlite() {
            redeem_otp_sqlite(pool, &self.tables, id, otp, issued_token_seq).await
        } else if let Some(pool) = self.store.as_postgres() {
            redeem_otp_postgres(pool, &self.tables, id, otp, issued_token_seq).await
        } else {
            Err(StorageError::Storage("Unsupported database type".to_string()))
        }
    }
}
