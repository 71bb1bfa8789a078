use chrono::Utc;

use crate::cancel::Cancellation;
use crate::signin::{LoginId, SignInStatus};
use crate::storage::StorageError;
use crate::token::{LoginSessionClaims, TokenKind, generate_tokens, parse};

use super::engine::EmailLinkAuth;
use super::errors::EmailLinkError;
use super::types::SignedIn;

impl EmailLinkAuth {
    /// Poll from the requesting device for the outcome of its link.
    ///
    /// Fails with [`EmailLinkError::StatusNotVerified`] until the link has
    /// been followed. A record that is verified but whose tokens were not
    /// handed out through the link is consumed here, spending the
    /// status-poll secret. Once either path has produced tokens the poll
    /// fails with [`EmailLinkError::NoPendingLoginSession`].
    #[tracing::instrument(skip_all)]
    pub async fn status(
        &self,
        cancel: &Cancellation,
        login_session_token: &str,
    ) -> Result<SignedIn, EmailLinkError> {
        let claims = parse::<LoginSessionClaims>(
            TokenKind::LoginSession,
            login_session_token,
            &self.config.issuer,
            &self.config.login_session.secret,
        )?
        .claims;
        let id = LoginId::new(&claims.sub, &claims.device_unique_id);

        let record = match self.sign_ins.get_by_otp(cancel, &id, &claims.otp).await {
            Ok(record) => record,
            Err(StorageError::NotFound(_)) => return Err(EmailLinkError::NoPendingLoginSession),
            Err(e) => return Err(e.into()),
        };

        match record.status {
            SignInStatus::Pending => return Err(EmailLinkError::StatusNotVerified),
            SignInStatus::Consumed => {
                tracing::debug!(%id, "Tokens already produced for this link");
                return Err(EmailLinkError::NoPendingLoginSession);
            }
            SignInStatus::Verified => {}
        }

        let user_id = record
            .user_id
            .as_deref()
            .ok_or(EmailLinkError::NoPendingLoginSession)?;
        let metadata = self
            .sign_ins
            .get_metadata(cancel, user_id)
            .await?
            .unwrap_or_default();

        let tokens = generate_tokens(
            &self.config,
            record.token_issued_at.unwrap_or_else(Utc::now),
            user_id,
            &record.email,
            &record.device_unique_id,
            record.issued_token_seq,
            &metadata,
        )?;

        self.sign_ins
            .redeem_otp(cancel, &id, &claims.otp, record.issued_token_seq)
            .await
            .map_err(|e| match e {
                StorageError::NoRowsAffected(_) => EmailLinkError::NoPendingLoginSession,
                other => other.into(),
            })?;

        tracing::info!(%id, issued_token_seq = record.issued_token_seq, "Status poll delivered tokens");

        Ok(SignedIn {
            tokens,
            email_confirmed: record.email_confirmed_at.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_engine;

    #[tokio::test]
    async fn test_status_before_sign_in_is_not_verified() {
        let engine = test_engine().await;
        let pending = engine.request("alice@x.com", "D1").await;

        let result = engine
            .auth
            .status(&Cancellation::new(), &pending.login_session_token)
            .await;

        assert!(matches!(result, Err(EmailLinkError::StatusNotVerified)));
    }

    #[tokio::test]
    async fn test_status_after_sign_in_is_refused() {
        let engine = test_engine().await;
        let cancel = Cancellation::new();
        let pending = engine.request("alice@x.com", "D1").await;
        let token = engine.flow_token("alice@x.com").await;
        engine
            .auth
            .sign_in(&cancel, &token, &pending.confirmation_code)
            .await
            .unwrap();

        // The link follower already received the tokens for this link
        let polled = engine
            .auth
            .status(&cancel, &pending.login_session_token)
            .await;
        assert!(matches!(polled, Err(EmailLinkError::NoPendingLoginSession)));
    }

    #[tokio::test]
    async fn test_status_consumes_verified_record_once() {
        // Given a record finalized by a sign-in that never consumed it
        let engine = test_engine().await;
        let cancel = Cancellation::new();
        let pending = engine.request("alice@x.com", "D1").await;
        let record = engine.record("alice@x.com", "D1").await;
        let user_id = record.user_id.clone().unwrap();
        let finalized = engine
            .auth
            .finalize(&cancel, &record, &user_id, false, Utc::now())
            .await
            .unwrap();

        // When the requesting device polls
        let polled = engine
            .auth
            .status(&cancel, &pending.login_session_token)
            .await
            .expect("status");

        // Then it gets tokens at the finalized sequence, exactly once
        let access = engine
            .auth
            .verify_access_token(&polled.tokens.access_token)
            .unwrap();
        assert_eq!(access.sub, user_id);
        assert_eq!(access.seq, finalized.issued_token_seq);
        assert_eq!(
            engine.record("alice@x.com", "D1").await.status,
            SignInStatus::Consumed
        );

        let again = engine
            .auth
            .status(&cancel, &pending.login_session_token)
            .await;
        assert!(matches!(again, Err(EmailLinkError::NoPendingLoginSession)));

        // The sign-in that finalized can no longer consume
        let consumed = engine
            .auth
            .sign_ins
            .consume(
                &cancel,
                &record.login_id(),
                &pending.confirmation_code,
                finalized.issued_token_seq,
                None,
            )
            .await;
        assert!(matches!(consumed, Err(StorageError::NoRowsAffected(_))));
    }

    #[tokio::test]
    async fn test_status_with_superseded_session_token() {
        let engine = test_engine().await;
        let first = engine.request("alice@x.com", "D1").await;
        engine.request("alice@x.com", "D1").await;

        // The renewal rotated the status-poll secret
        let result = engine
            .auth
            .status(&Cancellation::new(), &first.login_session_token)
            .await;
        assert!(matches!(result, Err(EmailLinkError::NoPendingLoginSession)));
    }

    #[tokio::test]
    async fn test_status_rejects_flow_token() {
        let engine = test_engine().await;
        engine.request("alice@x.com", "D1").await;
        let flow_token = engine.flow_token("alice@x.com").await;

        let result = engine.auth.status(&Cancellation::new(), &flow_token).await;
        assert!(matches!(result, Err(EmailLinkError::InvalidToken(_))));
    }
}
