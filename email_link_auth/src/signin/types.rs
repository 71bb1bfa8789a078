use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::metadata::AccountMetadata;
use crate::storage::StorageError;

/// Primary key of a sign-in record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoginId {
    pub email: String,
    pub device_unique_id: String,
}

impl LoginId {
    pub fn new(email: impl Into<String>, device_unique_id: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            device_unique_id: device_unique_id.into(),
        }
    }
}

impl fmt::Display for LoginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.email, self.device_unique_id)
    }
}

/// Where a record stands in the sign-in flow
///
/// `Pending` → `Verified` happens in the finalize write, `Verified` →
/// `Consumed` once the tokens have been handed to the link follower. A
/// renewed link moves any state back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignInStatus {
    Pending,
    Verified,
    Consumed,
}

impl SignInStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Consumed => "consumed",
        }
    }
}

impl fmt::Display for SignInStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignInStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "verified" => Ok(Self::Verified),
            "consumed" => Ok(Self::Consumed),
            other => Err(StorageError::Serde(format!(
                "Unknown sign-in status: {other}"
            ))),
        }
    }
}

/// Durable state of the passwordless flow for one (email, device) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignInRecord {
    pub email: String,
    pub device_unique_id: String,
    pub created_at: DateTime<Utc>,
    pub token_issued_at: Option<DateTime<Utc>>,
    pub email_confirmed_at: Option<DateTime<Utc>>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub confirmation_code: String,
    /// Status-poll secret; `None` once redeemed
    pub otp: Option<String>,
    pub status: SignInStatus,
    pub confirmation_code_wrong_attempts_count: i64,
    pub issued_token_seq: i64,
    pub previously_issued_token_seq: i64,
    pub user_id: Option<String>,
    pub phone_number_to_email_migration_user_id: Option<String>,
    /// Metadata of the resolved account, loaded alongside the record
    #[serde(default)]
    pub metadata: Option<AccountMetadata>,
}

impl SignInRecord {
    pub fn login_id(&self) -> LoginId {
        LoginId::new(&self.email, &self.device_unique_id)
    }

    pub(crate) fn is_migrating_from_phone(&self) -> bool {
        self.phone_number_to_email_migration_user_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
    }
}

/// Raw row as stored; `status` is converted into [`SignInStatus`]
#[derive(Debug, FromRow)]
pub(super) struct SignInRow {
    email: String,
    device_unique_id: String,
    created_at: DateTime<Utc>,
    token_issued_at: Option<DateTime<Utc>>,
    email_confirmed_at: Option<DateTime<Utc>>,
    blocked_until: Option<DateTime<Utc>>,
    confirmation_code: String,
    otp: Option<String>,
    status: String,
    confirmation_code_wrong_attempts_count: i64,
    issued_token_seq: i64,
    previously_issued_token_seq: i64,
    user_id: Option<String>,
    phone_number_to_email_migration_user_id: Option<String>,
}

impl TryFrom<SignInRow> for SignInRecord {
    type Error = StorageError;

    fn try_from(row: SignInRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse()?,
            email: row.email,
            device_unique_id: row.device_unique_id,
            created_at: row.created_at,
            token_issued_at: row.token_issued_at,
            email_confirmed_at: row.email_confirmed_at,
            blocked_until: row.blocked_until,
            confirmation_code: row.confirmation_code,
            otp: row.otp,
            confirmation_code_wrong_attempts_count: row.confirmation_code_wrong_attempts_count,
            issued_token_seq: row.issued_token_seq,
            previously_issued_token_seq: row.previously_issued_token_seq,
            user_id: row.user_id,
            phone_number_to_email_migration_user_id: row.phone_number_to_email_migration_user_id,
            metadata: None,
        })
    }
}

/// Values written when a link is requested
#[derive(Debug, Clone)]
pub(crate) struct NewSignIn {
    pub(crate) id: LoginId,
    pub(crate) now: DateTime<Utc>,
    pub(crate) confirmation_code: String,
    pub(crate) otp: String,
    /// Account the directory already knows for this email (or the old email)
    pub(crate) resolved_user_id: Option<String>,
    /// Used only when neither the directory nor the row has a user id yet
    pub(crate) generated_user_id: String,
    pub(crate) phone_number_to_email_migration_user_id: Option<String>,
}

/// The finalize transition, conditioned on `observed_seq`
#[derive(Debug, Clone)]
pub(crate) struct Finalization<'a> {
    pub(crate) id: &'a LoginId,
    pub(crate) user_id: &'a str,
    pub(crate) observed_seq: i64,
    pub(crate) email_confirmed: bool,
    pub(crate) metadata: &'a AccountMetadata,
    pub(crate) now: DateTime<Utc>,
}

impl Finalization<'_> {
    pub(super) fn email_confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.email_confirmed.then_some(self.now)
    }
}

/// Attempt refund applied together with the consume write
#[derive(Debug, Clone, Copy)]
pub(crate) struct IpRefund<'a> {
    pub(crate) ip: &'a str,
    pub(crate) login_session_number: i64,
}
