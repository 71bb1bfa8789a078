//! Interfaces to the systems the engine relies on but does not own
//!
//! The account directory, the external identity provider and mail delivery
//! are reached through these traits. Simple implementations are provided for
//! tests and local runs.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::metadata::AccountMetadata;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Directory of user accounts, keyed by user id
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_user_id_by_email(&self, email: &str)
    -> Result<Option<String>, CollaboratorError>;

    async fn modify_email(&self, user_id: &str, new_email: &str) -> Result<(), CollaboratorError>;
}

/// Third-party identity provider that mirrors account emails
#[async_trait]
pub trait ExternalIdentity: Send + Sync {
    async fn update_email(
        &self,
        metadata: &AccountMetadata,
        new_email: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Outbound mail
#[async_trait]
pub trait LinkMailer: Send + Sync {
    async fn send_sign_in_link(&self, email: &str, link: &str) -> Result<(), CollaboratorError>;

    async fn send_email_changed(
        &self,
        notify_email: &str,
        old_email: &str,
        new_email: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Account directory held in memory
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    emails: Mutex<HashMap<String, String>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user_id: impl Into<String>, email: impl Into<String>) {
        self.emails.lock().await.insert(user_id.into(), email.into());
    }

    pub async fn email_of(&self, user_id: &str) -> Option<String> {
        self.emails.lock().await.get(user_id).cloned()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccounts {
    async fn find_user_id_by_email(
        &self,
        email: &str,
    ) -> Result<Option<String>, CollaboratorError> {
        let emails = self.emails.lock().await;
        Ok(emails
            .iter()
            .find(|(_, stored)| stored.as_str() == email)
            .map(|(user_id, _)| user_id.clone()))
    }

    async fn modify_email(&self, user_id: &str, new_email: &str) -> Result<(), CollaboratorError> {
        let mut emails = self.emails.lock().await;
        match emails.get_mut(user_id) {
            Some(email) => {
                *email = new_email.to_string();
                Ok(())
            }
            None => Err(CollaboratorError::new(format!("unknown user {user_id}"))),
        }
    }
}

/// Identity provider for deployments without one
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExternalIdentity;

#[async_trait]
impl ExternalIdentity for NoopExternalIdentity {
    async fn update_email(
        &self,
        metadata: &AccountMetadata,
        new_email: &str,
    ) -> Result<(), CollaboratorError> {
        tracing::debug!(
            external_id = metadata.external_id(),
            new_email,
            "No external identity provider configured"
        );
        Ok(())
    }
}

/// A message handed to [`RecordingMailer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMail {
    SignInLink { to: String, link: String },
    EmailChanged { to: String, old_email: String, new_email: String },
}

/// Mailer that logs every message and keeps a copy
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }

    /// Most recent sign-in link sent to `email`
    pub async fn last_link_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find_map(|mail| match mail {
                SentMail::SignInLink { to, link } if to == email => Some(link.clone()),
                _ => None,
            })
    }
}

#[async_trait]
impl LinkMailer for RecordingMailer {
    async fn send_sign_in_link(&self, email: &str, link: &str) -> Result<(), CollaboratorError> {
        tracing::info!(to = email, "Sending sign-in link");
        self.sent.lock().await.push(SentMail::SignInLink {
            to: email.to_string(),
            link: link.to_string(),
        });
        Ok(())
    }

    async fn send_email_changed(
        &self,
        notify_email: &str,
        old_email: &str,
        new_email: &str,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(to = notify_email, old_email, new_email, "Sending email change notice");
        self.sent.lock().await.push(SentMail::EmailChanged {
            to: notify_email.to_string(),
            old_email: old_email.to_string(),
            new_email: new_email.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_accounts_lookup_and_modify() {
        let accounts = InMemoryAccounts::new();
        accounts.insert("usr_1", "alice@x.com").await;

        assert_eq!(
            accounts.find_user_id_by_email("alice@x.com").await.unwrap(),
            Some("usr_1".to_string())
        );

        accounts.modify_email("usr_1", "alice@y.com").await.unwrap();
        assert_eq!(accounts.find_user_id_by_email("alice@x.com").await.unwrap(), None);
        assert_eq!(accounts.email_of("usr_1").await.as_deref(), Some("alice@y.com"));
    }

    #[tokio::test]
    async fn test_modify_unknown_account_fails() {
        let accounts = InMemoryAccounts::new();
        assert!(accounts.modify_email("usr_404", "a@x.com").await.is_err());
    }

    #[tokio::test]
    async fn test_recording_mailer_returns_latest_link() {
        let mailer = RecordingMailer::new();
        mailer.send_sign_in_link("alice@x.com", "https://a/1").await.unwrap();
        mailer.send_sign_in_link("bob@x.com", "https://b/1").await.unwrap();
        mailer.send_sign_in_link("alice@x.com", "https://a/2").await.unwrap();

        assert_eq!(
            mailer.last_link_for("alice@x.com").await.as_deref(),
            Some("https://a/2")
        );
        assert_eq!(mailer.last_link_for("carol@x.com").await, None);
        assert_eq!(mailer.sent().await.len(), 3);
    }
}
