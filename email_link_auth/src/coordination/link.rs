use chrono::Utc;
use url::Url;
use uuid::Uuid;

use crate::cancel::Cancellation;
use crate::signin::{LoginId, NewSignIn};
use crate::storage::StorageError;
use crate::token::{LoginFlowClaims, LoginSessionClaims, TokenKind, issue};
use crate::utils::{gen_confirmation_code, gen_random_string, normalize_email};

use super::engine::EmailLinkAuth;
use super::errors::EmailLinkError;
use super::types::{LinkRequest, PendingSignIn};

/// Bytes of randomness in a status-poll secret
const OTP_BYTES: usize = 32;

impl EmailLinkAuth {
    /// Start (or restart) a sign-in for `request.email` on `request.device_unique_id`.
    ///
    /// The emailed link carries an email-validation token; the returned
    /// login-session token lets the requesting device poll with
    /// [`EmailLinkAuth::status`]. Asking again before signing in renews the
    /// code and secret on the same record, unless the record is blocked.
    #[tracing::instrument(
        skip(self, cancel, request),
        fields(email = %request.email, device_unique_id = %request.device_unique_id)
    )]
    pub async fn request_link(
        &self,
        cancel: &Cancellation,
        request: LinkRequest,
    ) -> Result<PendingSignIn, EmailLinkError> {
        let request = normalize_request(request)?;
        let now = Utc::now();
        let login_session_number = self.config.login_session_number(now.timestamp());

        if let Some(ip) = request.client_ip.as_deref() {
            self.limiter
                .admit(cancel, ip, login_session_number)
                .await
                .map_err(|e| match e {
                    StorageError::ConstraintViolation(_) => EmailLinkError::TooManyAttempts,
                    other => EmailLinkError::from(other),
                })?;
        }

        let result = self
            .issue_link(cancel, &request, now, login_session_number)
            .await;

        // An attempt is only charged when a link actually went out
        if result.is_err() {
            if let Some(ip) = request.client_ip.as_deref() {
                if let Err(e) = self.limiter.refund(cancel, ip, login_session_number).await {
                    tracing::warn!(ip, error = %e, "Failed to refund ip attempt");
                }
            }
        }

        result
    }

    async fn issue_link(
        &self,
        cancel: &Cancellation,
        request: &LinkRequest,
        now: chrono::DateTime<Utc>,
        login_session_number: i64,
    ) -> Result<PendingSignIn, EmailLinkError> {
        let resolved_user_id = self.resolve_requesting_account(request).await?;

        let confirmation_code = gen_confirmation_code(self.config.confirmation_code_length)?;
        let otp = gen_random_string(OTP_BYTES)?;

        let new = NewSignIn {
            id: LoginId::new(&request.email, &request.device_unique_id),
            now,
            confirmation_code: confirmation_code.clone(),
            otp: otp.clone(),
            resolved_user_id,
            generated_user_id: format!(
                "{}{}",
                self.config.native_id_prefix,
                Uuid::new_v4().simple()
            ),
            phone_number_to_email_migration_user_id: request
                .phone_number_to_email_migration_user_id
                .clone(),
        };

        let Some(record) = self.sign_ins.create_or_renew(cancel, &new).await? else {
            tracing::warn!(id = %new.id, "Link request refused: record is blocked");
            return Err(EmailLinkError::AttemptsExceeded);
        };

        let flow_token = issue(
            TokenKind::EmailValidation,
            LoginFlowClaims {
                sub: record.email.clone(),
                device_unique_id: record.device_unique_id.clone(),
                old_email: request.old_email.clone(),
                notify_email: request.notify_email.clone(),
                client_ip: request.client_ip.clone(),
                login_session_number,
            },
            &self.config.issuer,
            &self.config.email_validation.secret,
            self.config.email_validation.ttl,
            now,
        )?;

        let login_session_token = issue(
            TokenKind::LoginSession,
            LoginSessionClaims {
                sub: record.email.clone(),
                device_unique_id: record.device_unique_id.clone(),
                confirmation_code: confirmation_code.clone(),
                otp,
                login_session_number,
            },
            &self.config.issuer,
            &self.config.login_session.secret,
            self.config.login_session.ttl,
            now,
        )?;

        let link = self.sign_in_link(&flow_token)?;
        self.mailer
            .send_sign_in_link(&record.email, link.as_str())
            .await?;

        tracing::info!(
            id = %new.id,
            issued_token_seq = record.issued_token_seq,
            "Sign-in link sent"
        );

        Ok(PendingSignIn {
            login_session_token,
            confirmation_code,
        })
    }

    /// The account a new record should be tied to, if one already exists
    async fn resolve_requesting_account(
        &self,
        request: &LinkRequest,
    ) -> Result<Option<String>, EmailLinkError> {
        if let Some(old_email) = request.old_email.as_deref() {
            let user_id = self
                .accounts
                .find_user_id_by_email(old_email)
                .await?
                .ok_or_else(|| EmailLinkError::NotFound(format!("account for {old_email}")))?;
            return Ok(Some(user_id));
        }

        if let Some(user_id) = self.accounts.find_user_id_by_email(&request.email).await? {
            return Ok(Some(user_id));
        }

        Ok(request.phone_number_to_email_migration_user_id.clone())
    }

    fn sign_in_link(&self, flow_token: &str) -> Result<Url, EmailLinkError> {
        let mut link = Url::parse(&self.config.link_base_url).map_err(|e| {
            EmailLinkError::InvalidInput(format!(
                "invalid link base url {}: {e}",
                self.config.link_base_url
            ))
        })?;
        link.query_pairs_mut().append_pair("token", flow_token);
        Ok(link)
    }
}

fn normalize_request(mut request: LinkRequest) -> Result<LinkRequest, EmailLinkError> {
    request.email = normalize_email(&request.email);
    if !is_plausible_email(&request.email) {
        return Err(EmailLinkError::InvalidInput(format!(
            "invalid email: {}",
            request.email
        )));
    }

    request.device_unique_id = request.device_unique_id.trim().to_string();
    if request.device_unique_id.is_empty() {
        return Err(EmailLinkError::InvalidInput(
            "device_unique_id is required".to_string(),
        ));
    }

    request.old_email = request
        .old_email
        .map(|old| normalize_email(&old))
        .filter(|old| !old.is_empty());
    if let Some(old) = request.old_email.as_deref() {
        if old == request.email {
            return Err(EmailLinkError::InvalidInput(
                "old email equals the new email".to_string(),
            ));
        }
    }

    request.notify_email = request
        .notify_email
        .map(|notify| normalize_email(&notify))
        .filter(|notify| !notify.is_empty());
    request.client_ip = request.client_ip.filter(|ip| !ip.trim().is_empty());
    request.phone_number_to_email_migration_user_id = request
        .phone_number_to_email_migration_user_id
        .filter(|id| !id.is_empty());

    Ok(request)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}
