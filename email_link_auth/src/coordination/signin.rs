use chrono::{DateTime, Utc};

use crate::cancel::Cancellation;
use crate::signin::{IpRefund, LoginId, SignInRecord, SignInStatus};
use crate::storage::StorageError;
use crate::token::{LoginFlowClaims, TokenKind, generate_tokens, parse};

use super::engine::EmailLinkAuth;
use super::errors::EmailLinkError;
use super::migration::EmailChange;
use super::types::SignedIn;

impl EmailLinkAuth {
    /// Complete a sign-in from the emailed link.
    ///
    /// `email_validation_token` is the token carried by the link and
    /// `confirmation_code` the code shown on the requesting device. Tokens
    /// are produced at most once per link; a replay fails with
    /// [`EmailLinkError::NoPendingLoginSession`].
    #[tracing::instrument(skip_all)]
    pub async fn sign_in(
        &self,
        cancel: &Cancellation,
        email_validation_token: &str,
        confirmation_code: &str,
    ) -> Result<SignedIn, EmailLinkError> {
        let now = Utc::now();
        let claims = parse::<LoginFlowClaims>(
            TokenKind::EmailValidation,
            email_validation_token,
            &self.config.issuer,
            &self.config.email_validation.secret,
        )?
        .claims;

        let id = LoginId::new(&claims.sub, &claims.device_unique_id);
        let record = match self
            .get_by_key(cancel, &id, claims.old_email.as_deref())
            .await
        {
            Ok(record) => record,
            Err(EmailLinkError::NotFound(msg)) => {
                tracing::debug!(%id, "No sign-in to complete: {}", msg);
                return Err(EmailLinkError::NoPendingLoginSession);
            }
            Err(e) => return Err(e),
        };

        self.finish_sign_in(cancel, record, &claims, confirmation_code, now)
            .await
    }

    /// Everything after the record has been read: verify, migrate, finalize,
    /// mint, consume.
    pub(super) async fn finish_sign_in(
        &self,
        cancel: &Cancellation,
        mut record: SignInRecord,
        claims: &LoginFlowClaims,
        confirmation_code: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedIn, EmailLinkError> {
        let id = record.login_id();
        if record.status != SignInStatus::Pending {
            tracing::warn!(%id, status = %record.status, "Tokens already produced for this link");
            return Err(EmailLinkError::NoPendingLoginSession);
        }

        self.verify_confirmation_code(cancel, &record, confirmation_code, now)
            .await?;

        let user_id = record
            .user_id
            .clone()
            .ok_or_else(|| EmailLinkError::NotFound(format!("account for {id}")))?;
        let old_email = claims.old_email.as_deref();

        let mut email_confirmed = false;
        if old_email.is_some() || record.is_migrating_from_phone() {
            email_confirmed = self
                .apply_email_change(
                    cancel,
                    &mut record,
                    EmailChange {
                        user_id: &user_id,
                        new_email: &claims.sub,
                        old_email,
                        notify_email: claims.notify_email.as_deref(),
                    },
                )
                .await?;
        }

        let finalized = match self
            .finalize(cancel, &record, &user_id, email_confirmed, now)
            .await
        {
            Ok(finalized) => finalized,
            // The winner finalized this same email change; reverting would undo it
            Err(EmailLinkError::RaceLost) => {
                if old_email.is_some() {
                    tracing::info!(%id, user_id, "Email change kept: owned by the concurrent sign-in");
                }
                return Err(EmailLinkError::RaceLost);
            }
            Err(finalize_error) => {
                let mut errors = match old_email {
                    Some(old_email) => self.revert_email_change(&record, &user_id, old_email).await,
                    None => Vec::new(),
                };
                if errors.is_empty() {
                    return Err(finalize_error);
                }
                errors.push(finalize_error);
                return Err(EmailLinkError::Multiple(errors).log());
            }
        };

        let tokens = generate_tokens(
            &self.config,
            now,
            &user_id,
            &record.email,
            &record.device_unique_id,
            finalized.issued_token_seq,
            &finalized.metadata,
        )?;

        let refund = claims
            .client_ip
            .as_deref()
            .filter(|ip| !ip.is_empty() && claims.login_session_number > 0)
            .map(|ip| IpRefund {
                ip,
                login_session_number: claims.login_session_number,
            });

        self.sign_ins
            .consume(
                cancel,
                &id,
                confirmation_code,
                finalized.issued_token_seq,
                refund,
            )
            .await
            .map_err(|e| match e {
                StorageError::NoRowsAffected(_) => EmailLinkError::NoPendingLoginSession,
                other => other.into(),
            })?;

        tracing::info!(
            %id,
            user_id,
            issued_token_seq = finalized.issued_token_seq,
            email_confirmed,
            "Sign-in completed"
        );

        Ok(SignedIn {
            tokens,
            email_confirmed,
        })
    }
}
