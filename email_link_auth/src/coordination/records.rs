use crate::cancel::Cancellation;
use crate::signin::{LoginId, SignInRecord};

use super::engine::EmailLinkAuth;
use super::errors::EmailLinkError;

impl EmailLinkAuth {
    /// Load the record for `id` with its account resolved.
    ///
    /// With `expected_old_email` the record must belong to the account that
    /// currently owns the old email. Otherwise the account owning `id.email`
    /// wins, then the phone migration marker, then the id stored on the row.
    /// The resolved account's metadata is loaded into the record.
    pub(super) async fn get_by_key(
        &self,
        cancel: &Cancellation,
        id: &LoginId,
        expected_old_email: Option<&str>,
    ) -> Result<SignInRecord, EmailLinkError> {
        let mut record = self.sign_ins.get(cancel, id).await?;

        let user_id = match expected_old_email {
            Some(old_email) => self
                .accounts
                .find_user_id_by_email(old_email)
                .await?
                .ok_or_else(|| EmailLinkError::NotFound(format!("account for {old_email}")))?,
            None => match self.accounts.find_user_id_by_email(&id.email).await? {
                Some(user_id) => user_id,
                None => record
                    .phone_number_to_email_migration_user_id
                    .clone()
                    .filter(|user_id| !user_id.is_empty())
                    .or_else(|| record.user_id.clone())
                    .ok_or_else(|| EmailLinkError::NotFound(format!("account for {id}")))?,
            },
        };

        record.metadata = self.sign_ins.get_metadata(cancel, &user_id).await?;
        record.user_id = Some(user_id);

        Ok(record)
    }
}
