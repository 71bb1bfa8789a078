use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;

use crate::cancel::Cancellation;
use crate::signin::SignInRecord;

use super::engine::EmailLinkAuth;
use super::errors::EmailLinkError;

impl EmailLinkAuth {
    /// Check `presented` against the record's confirmation code and apply
    /// the wrong-attempt blocking policy.
    ///
    /// A correct code never mutates the record. A wrong code, or any code
    /// while a block is due, bumps the attempt counter; failures of that
    /// write are reported alongside `WrongCode` instead of replacing it.
    pub(super) async fn verify_confirmation_code(
        &self,
        cancel: &Cancellation,
        record: &SignInRecord,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EmailLinkError> {
        let max_attempts = self.config.max_wrong_attempts;
        let block_duration = self.config.block_duration;
        let attempts = record.confirmation_code_wrong_attempts_count;

        let mut errors = Vec::new();
        let mut block_due = false;

        if attempts >= max_attempts {
            let block_in_force = record
                .blocked_until
                .is_some_and(|until| until > record.created_at && until < now + block_duration);
            if block_in_force {
                tracing::warn!(
                    email = %record.email,
                    device_unique_id = %record.device_unique_id,
                    attempts,
                    "Confirmation rejected: record is blocked"
                );
                return Err(EmailLinkError::AttemptsExceeded);
            }
            block_due = true;
            errors.push(EmailLinkError::AttemptsExceeded);
        }

        let code_matches: bool = record
            .confirmation_code
            .as_bytes()
            .ct_eq(presented.as_bytes())
            .into();

        if code_matches && !block_due {
            return Ok(());
        }

        let install_block = block_due || attempts + 1 >= max_attempts;
        let blocked_until = install_block.then(|| now + block_duration);

        if let Err(e) = self
            .sign_ins
            .increase_wrong_attempts(cancel, &record.login_id(), blocked_until)
            .await
        {
            errors.push(EmailLinkError::from(e));
        }

        errors.push(EmailLinkError::WrongCode);
        if install_block && !block_due {
            tracing::warn!(
                email = %record.email,
                device_unique_id = %record.device_unique_id,
                blocked_until = ?blocked_until,
                "Wrong confirmation code limit reached, blocking record"
            );
            errors.push(EmailLinkError::AttemptsExceeded);
        }

        Err(EmailLinkError::aggregate(errors).unwrap_or(EmailLinkError::WrongCode))
    }
}
