use std::sync::Arc;

use crate::cancel::Cancellation;
use crate::config::EmailLinkConfig;
use crate::ratelimit::RateLimiter;
use crate::signin::{LoginId, SignInRecord, SignInStore};
use crate::storage::{DataStore, TableNames};
use crate::token::{AccessClaims, RefreshClaims, TokenKind, parse};
use crate::utils::normalize_email;

use super::collaborators::{AccountRepository, ExternalIdentity, LinkMailer};
use super::errors::EmailLinkError;

/// The passwordless email-link sign-in engine
///
/// Holds no per-request state: every operation reads the sign-in record,
/// decides, and writes back through a conditional update, so one engine can
/// serve any number of concurrent requests.
pub struct EmailLinkAuth {
    pub(crate) config: EmailLinkConfig,
    pub(crate) sign_ins: SignInStore,
    pub(crate) limiter: RateLimiter,
    pub(crate) accounts: Arc<dyn AccountRepository>,
    pub(crate) identity: Arc<dyn ExternalIdentity>,
    pub(crate) mailer: Arc<dyn LinkMailer>,
}

impl EmailLinkAuth {
    pub fn new(
        config: EmailLinkConfig,
        data_store: Arc<dyn DataStore>,
        accounts: Arc<dyn AccountRepository>,
        identity: Arc<dyn ExternalIdentity>,
        mailer: Arc<dyn LinkMailer>,
    ) -> Self {
        let tables = TableNames::with_prefix(&config.table_prefix);
        Self {
            sign_ins: SignInStore::new(data_store.clone(), tables.clone()),
            limiter: RateLimiter::new(data_store, tables, config.max_attempts_per_ip),
            config,
            accounts,
            identity,
            mailer,
        }
    }

    /// Create and validate the engine's tables
    pub async fn init(&self) -> Result<(), EmailLinkError> {
        self.sign_ins.init().await?;
        self.limiter.init().await?;
        tracing::info!(
            table_prefix = %self.config.table_prefix,
            "Email link sign-in tables ready"
        );
        Ok(())
    }

    pub fn config(&self) -> &EmailLinkConfig {
        &self.config
    }

    /// The stored record for `email` on `device_unique_id`, as persisted
    pub async fn sign_in_record(
        &self,
        cancel: &Cancellation,
        email: &str,
        device_unique_id: &str,
    ) -> Result<SignInRecord, EmailLinkError> {
        let id = LoginId::new(normalize_email(email), device_unique_id);
        Ok(self.sign_ins.get(cancel, &id).await?)
    }

    /// Check signature, issuer and expiry of an access token
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, EmailLinkError> {
        let envelope = parse::<AccessClaims>(
            TokenKind::Access,
            token,
            &self.config.issuer,
            &self.config.access_token.secret,
        )?;
        Ok(envelope.claims)
    }

    /// Check a refresh token and that it was minted at the record's current
    /// issued-token sequence; tokens from earlier sign-ins are rejected.
    pub async fn verify_refresh_token(
        &self,
        cancel: &Cancellation,
        token: &str,
    ) -> Result<RefreshClaims, EmailLinkError> {
        let claims = parse::<RefreshClaims>(
            TokenKind::Refresh,
            token,
            &self.config.issuer,
            &self.config.refresh_token.secret,
        )?
        .claims;

        let id = LoginId::new(&claims.email, &claims.device_unique_id);
        let record = match self.sign_ins.get(cancel, &id).await {
            Ok(record) => record,
            Err(e) => match EmailLinkError::from(e) {
                EmailLinkError::NotFound(_) => {
                    return Err(EmailLinkError::InvalidToken(
                        "no sign-in for refresh token".to_string(),
                    ));
                }
                other => return Err(other),
            },
        };

        if record.issued_token_seq != claims.seq {
            tracing::warn!(
                %id,
                token_seq = claims.seq,
                current_seq = record.issued_token_seq,
                "Refresh token superseded by a later sign-in"
            );
            return Err(EmailLinkError::InvalidToken(
                "refresh token superseded".to_string(),
            ));
        }

        Ok(claims)
    }
}
