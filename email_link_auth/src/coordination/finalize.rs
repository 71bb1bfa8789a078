use chrono::{DateTime, Utc};

use crate::cancel::Cancellation;
use crate::metadata::{AccountMetadata, merge_for_sign_in};
use crate::signin::{Finalization, SignInRecord};
use crate::storage::StorageError;

use super::engine::EmailLinkAuth;
use super::errors::EmailLinkError;

/// Result of a won finalize race
#[derive(Debug, Clone)]
pub(super) struct Finalized {
    pub(super) issued_token_seq: i64,
    pub(super) metadata: AccountMetadata,
}

impl EmailLinkAuth {
    /// Promote `record` to verified for `user_id` and store the merged
    /// account metadata, conditioned on the record's observed sequence.
    ///
    /// Losing the race yields [`EmailLinkError::RaceLost`]. Callers must not
    /// retry: the winner has already produced tokens.
    pub(super) async fn finalize(
        &self,
        cancel: &Cancellation,
        record: &SignInRecord,
        user_id: &str,
        email_confirmed: bool,
        now: DateTime<Utc>,
    ) -> Result<Finalized, EmailLinkError> {
        let metadata = merge_for_sign_in(
            record.metadata.as_ref(),
            user_id,
            &self.config.native_id_prefix,
        );
        let id = record.login_id();

        let result = self
            .sign_ins
            .finalize(
                cancel,
                &Finalization {
                    id: &id,
                    user_id,
                    observed_seq: record.issued_token_seq,
                    email_confirmed,
                    metadata: &metadata,
                    now,
                },
            )
            .await;

        match result {
            Ok(issued_token_seq) => Ok(Finalized {
                issued_token_seq,
                metadata,
            }),
            Err(StorageError::NoRowsAffected(msg)) => {
                tracing::warn!(%id, observed_seq = record.issued_token_seq, "Finalize lost race: {}", msg);
                Err(EmailLinkError::RaceLost)
            }
            Err(e) => Err(e.into()),
        }
    }
}
