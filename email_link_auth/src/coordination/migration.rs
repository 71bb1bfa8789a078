//! Email changes that ride along with a sign-in
//!
//! A sign-in can move an account to a new email (the link request carried an
//! old email) or attach an email to an account that used to sign in with a
//! phone number. The change is applied before finalize; if finalize fails,
//! an email change is reverted and every compensation outcome is reported.

use crate::cancel::Cancellation;
use crate::signin::SignInRecord;

use super::engine::EmailLinkAuth;
use super::errors::EmailLinkError;

/// The email change a sign-in performs
#[derive(Debug, Clone, Copy)]
pub(super) struct EmailChange<'a> {
    pub(super) user_id: &'a str,
    pub(super) new_email: &'a str,
    pub(super) old_email: Option<&'a str>,
    pub(super) notify_email: Option<&'a str>,
}

impl EmailLinkAuth {
    /// Move the account to `change.new_email`.
    ///
    /// Returns whether the new email counts as confirmed, which is the case
    /// for an email change but not for a phone migration.
    pub(super) async fn apply_email_change(
        &self,
        cancel: &Cancellation,
        record: &mut SignInRecord,
        change: EmailChange<'_>,
    ) -> Result<bool, EmailLinkError> {
        cancel.check()?;

        self.accounts
            .modify_email(change.user_id, change.new_email)
            .await?;

        if let Some(metadata) = record.metadata.as_ref().filter(|md| md.external_id().is_some()) {
            if let Err(e) = self.identity.update_email(metadata, change.new_email).await {
                let mut errors = vec![EmailLinkError::from(e)];
                if let Some(old_email) = change.old_email {
                    match self.accounts.modify_email(change.user_id, old_email).await {
                        Ok(()) => errors.push(EmailLinkError::EmailChangeReverted {
                            old_email: old_email.to_string(),
                        }),
                        Err(e) => errors.push(e.into()),
                    }
                }
                return Err(EmailLinkError::Multiple(errors));
            }
        }

        if let (Some(notify_email), Some(old_email)) = (change.notify_email, change.old_email) {
            if let Err(e) = self
                .mailer
                .send_email_changed(notify_email, old_email, change.new_email)
                .await
            {
                tracing::warn!(
                    notify_email,
                    error = %e,
                    "Failed to send email change notification"
                );
            }
        }

        record.email = change.new_email.to_string();
        tracing::info!(
            user_id = change.user_id,
            old_email = change.old_email,
            new_email = change.new_email,
            "Account email changed during sign-in"
        );

        Ok(change.old_email.is_some())
    }

    /// Undo an applied email change after finalize failed.
    ///
    /// Runs even when the caller has cancelled. Returns one entry per
    /// compensation: [`EmailLinkError::EmailChangeReverted`] when the account
    /// email was restored, the collaborator error otherwise.
    pub(super) async fn revert_email_change(
        &self,
        record: &SignInRecord,
        user_id: &str,
        old_email: &str,
    ) -> Vec<EmailLinkError> {
        let mut outcomes = Vec::new();

        match self.accounts.modify_email(user_id, old_email).await {
            Ok(()) => {
                tracing::info!(user_id, old_email, "Reverted account email change");
                outcomes.push(EmailLinkError::EmailChangeReverted {
                    old_email: old_email.to_string(),
                });
            }
            Err(e) => outcomes.push(e.into()),
        }

        if let Some(metadata) = record.metadata.as_ref().filter(|md| md.external_id().is_some()) {
            if let Err(e) = self.identity.update_email(metadata, old_email).await {
                outcomes.push(e.into());
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::collaborators::SentMail;
    use crate::metadata::{AccountMetadata, EXTERNAL_ID_CLAIM};
    use crate::test_utils::test_engine;

    fn change<'a>(old_email: Option<&'a str>, notify_email: Option<&'a str>) -> EmailChange<'a> {
        EmailChange {
            user_id: "usr_1",
            new_email: "new@x.com",
            old_email,
            notify_email,
        }
    }

    async fn record_for(engine: &crate::test_utils::TestEngine) -> SignInRecord {
        engine.request("new@x.com", "D1").await;
        engine.record("new@x.com", "D1").await
    }

    #[tokio::test]
    async fn test_email_change_updates_account_and_notifies() {
        let engine = test_engine().await;
        engine.accounts.insert("usr_1", "old@x.com").await;
        let mut record = record_for(&engine).await;

        let confirmed = engine
            .auth
            .apply_email_change(
                &Cancellation::new(),
                &mut record,
                change(Some("old@x.com"), Some("old@x.com")),
            )
            .await
            .expect("apply");

        assert!(confirmed);
        assert_eq!(engine.accounts.email_of("usr_1").await.as_deref(), Some("new@x.com"));
        assert!(engine.mailer.sent().await.contains(&SentMail::EmailChanged {
            to: "old@x.com".to_string(),
            old_email: "old@x.com".to_string(),
            new_email: "new@x.com".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_phone_migration_is_not_confirmed() {
        let engine = test_engine().await;
        engine.accounts.insert("usr_1", "").await;
        let mut record = record_for(&engine).await;

        let confirmed = engine
            .auth
            .apply_email_change(&Cancellation::new(), &mut record, change(None, None))
            .await
            .expect("apply");

        assert!(!confirmed);
        assert_eq!(engine.accounts.email_of("usr_1").await.as_deref(), Some("new@x.com"));
    }

    #[tokio::test]
    async fn test_external_identity_failure_reverts_account() {
        let engine = test_engine().await;
        engine.accounts.insert("usr_1", "old@x.com").await;
        engine.identity.fail_updates(true).await;
        let mut record = record_for(&engine).await;
        let mut metadata = AccountMetadata::default();
        metadata.insert(EXTERNAL_ID_CLAIM, "fb-1");
        record.metadata = Some(metadata);

        let err = engine
            .auth
            .apply_email_change(
                &Cancellation::new(),
                &mut record,
                change(Some("old@x.com"), None),
            )
            .await
            .unwrap_err();

        assert!(err.has(|e| matches!(e, EmailLinkError::Collaborator(_))));
        assert!(err.has(|e| matches!(e, EmailLinkError::EmailChangeReverted { .. })));
        assert_eq!(engine.accounts.email_of("usr_1").await.as_deref(), Some("old@x.com"));
    }

    #[tokio::test]
    async fn test_revert_reports_each_compensation() {
        let engine = test_engine().await;
        let record = record_for(&engine).await;

        // Unknown account: the revert itself fails
        let outcomes = engine
            .auth
            .revert_email_change(&record, "usr_missing", "old@x.com")
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], EmailLinkError::Collaborator(_)));
    }
}
