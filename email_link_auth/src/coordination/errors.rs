//! Error type reported by the sign-in engine

use thiserror::Error;

use crate::storage::StorageError;
use crate::token::TokenError;
use crate::utils::UtilError;

use super::collaborators::CollaboratorError;

/// Errors reported by [`crate::EmailLinkAuth`] operations
///
/// Several independent failures can occur in one operation (a wrong code and
/// a failed attempt-counter write, or a lost finalize race and its
/// compensations). Those are reported together as [`EmailLinkError::Multiple`];
/// use [`EmailLinkError::has`] instead of matching on the top-level variant.
#[derive(Error, Debug, Clone)]
pub enum EmailLinkError {
    /// Malformed, expired or forged token
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No sign-in is waiting for this code, or it already produced tokens
    #[error("No pending login session")]
    NoPendingLoginSession,

    #[error("Wrong confirmation code")]
    WrongCode,

    #[error("Too many wrong confirmation codes")]
    AttemptsExceeded,

    /// A concurrent request finalized the same record first
    #[error("Sign-in was finalized concurrently")]
    RaceLost,

    /// The link has not been followed yet
    #[error("Sign-in not verified yet")]
    StatusNotVerified,

    /// The per-IP link request budget is exhausted
    #[error("Too many sign-in attempts from this address")]
    TooManyAttempts,

    /// A compensating email change back to `old_email` succeeded
    #[error("Email change reverted to {old_email}")]
    EmailChangeReverted { old_email: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    /// Failure reported by a collaborator (account directory, identity provider, mailer)
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Token error: {0}")]
    Token(TokenError),

    #[error("Utils error: {0}")]
    Utils(UtilError),

    #[error("Multiple errors: {}", format_causes(.0))]
    Multiple(Vec<EmailLinkError>),
}

fn format_causes(errors: &[EmailLinkError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl EmailLinkError {
    /// Collapse a list of errors: none → `None`, one → itself, more → `Multiple`
    pub(crate) fn aggregate(mut errors: Vec<EmailLinkError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }

    /// Leaf errors, with nested aggregates flattened
    pub fn causes(&self) -> Vec<&EmailLinkError> {
        match self {
            Self::Multiple(errors) => errors.iter().flat_map(|e| e.causes()).collect(),
            other => vec![other],
        }
    }

    /// True if this error, or any error aggregated in it, matches `pred`
    pub fn has(&self, pred: impl Fn(&EmailLinkError) -> bool) -> bool {
        self.causes().into_iter().any(pred)
    }

    /// Log the error and return self
    pub fn log(self) -> Self {
        match &self {
            Self::WrongCode
            | Self::AttemptsExceeded
            | Self::NoPendingLoginSession
            | Self::StatusNotVerified
            | Self::TooManyAttempts
            | Self::InvalidToken(_) => tracing::warn!("{}", self),
            Self::Cancelled => tracing::debug!("{}", self),
            _ => tracing::error!("{}", self),
        }
        self
    }
}

impl From<StorageError> for EmailLinkError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Cancelled => Self::Cancelled,
            StorageError::NotFound(msg) => Self::NotFound(msg),
            other => {
                let error = Self::Storage(other.to_string());
                tracing::error!("{}", error);
                error
            }
        }
    }
}

impl From<TokenError> for EmailLinkError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(msg) => Self::InvalidToken(msg),
            TokenError::Expired => Self::InvalidToken("token expired".to_string()),
            other => {
                let error = Self::Token(other);
                tracing::error!("{}", error);
                error
            }
        }
    }
}

impl From<CollaboratorError> for EmailLinkError {
    fn from(err: CollaboratorError) -> Self {
        let error = Self::Collaborator(err.0);
        tracing::error!("{}", error);
        error
    }
}

impl From<UtilError> for EmailLinkError {
    fn from(err: UtilError) -> Self {
        let error = Self::Utils(err);
        tracing::error!("{}", error);
        error
    }
}
