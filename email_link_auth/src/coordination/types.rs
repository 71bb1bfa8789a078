use serde::{Deserialize, Serialize};

use crate::token::Tokens;

/// A request for a sign-in link
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRequest {
    /// Address the link is sent to, and the email the account ends up with
    pub email: String,
    pub device_unique_id: String,
    /// Counted against the per-IP budget when present
    pub client_ip: Option<String>,
    /// Current email of an account that is switching to `email`
    pub old_email: Option<String>,
    /// Address told about a completed email change
    pub notify_email: Option<String>,
    /// Account being moved from phone-number sign-in to email sign-in
    pub phone_number_to_email_migration_user_id: Option<String>,
}

impl LinkRequest {
    pub fn new(email: impl Into<String>, device_unique_id: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            device_unique_id: device_unique_id.into(),
            ..Default::default()
        }
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    pub fn with_email_change(
        mut self,
        old_email: impl Into<String>,
        notify_email: Option<String>,
    ) -> Self {
        self.old_email = Some(old_email.into());
        self.notify_email = notify_email;
        self
    }

    pub fn with_phone_migration(mut self, user_id: impl Into<String>) -> Self {
        self.phone_number_to_email_migration_user_id = Some(user_id.into());
        self
    }
}

/// Returned to the device that requested a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSignIn {
    /// Lets the device poll for the outcome with [`crate::EmailLinkAuth::status`]
    pub login_session_token: String,
    /// Shown on the requesting device; the link follower has to enter it
    pub confirmation_code: String,
}

/// Outcome of a completed sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedIn {
    pub tokens: Tokens,
    pub email_confirmed: bool,
}
