use serde::{Deserialize, Serialize};

use crate::metadata::AccountMetadata;

/// The kinds of token the engine signs. Each kind is stamped into the `aud`
/// claim, so a token issued as one kind never parses as another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    LoginSession,
    EmailValidation,
    Access,
    Refresh,
}

impl TokenKind {
    pub(crate) fn audience(&self) -> &'static str {
        match self {
            Self::LoginSession => "login_session",
            Self::EmailValidation => "email_validation",
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Registered claims shared by every token, with the kind-specific claims flattened in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Envelope<C> {
    pub(crate) iss: String,
    pub(crate) aud: String,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
    #[serde(flatten)]
    pub(crate) claims: C,
}

/// Handed to the device that requested the link. It carries the code the
/// device displays and the one-time value it polls status with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LoginSessionClaims {
    /// Email address the link was sent to
    pub(crate) sub: String,
    pub(crate) device_unique_id: String,
    pub(crate) confirmation_code: String,
    pub(crate) otp: String,
    pub(crate) login_session_number: i64,
}

/// Embedded in the emailed link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LoginFlowClaims {
    /// Email address the link was sent to
    pub(crate) sub: String,
    pub(crate) device_unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) old_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) notify_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) client_ip: Option<String>,
    pub(crate) login_session_number: i64,
}

/// Claims of a final access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Resolved user id
    pub sub: String,
    pub email: String,
    pub device_unique_id: String,
    /// Issued-token sequence the token was minted at
    pub seq: i64,
    #[serde(default)]
    pub metadata: AccountMetadata,
}

/// Claims of a final refresh token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub email: String,
    pub device_unique_id: String,
    pub seq: i64,
}

/// Final tokens returned by a successful sign-in or status poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
}
