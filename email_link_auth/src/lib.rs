//! email_link_auth - Passwordless sign-in through emailed links
//!
//! A user asks for a link on one device and is shown a confirmation code.
//! Following the link, on any device, and entering that code produces an
//! access/refresh token pair. Each link produces tokens once: the requesting
//! device polls [`EmailLinkAuth::status`] and only receives them when the
//! sign-in was finalized without handing them out.
//!
//! ```no_run
//! use std::sync::Arc;
//! use email_link_auth::{
//!     Cancellation, EmailLinkAuth, EmailLinkConfig, InMemoryAccounts, LinkRequest,
//!     NoopExternalIdentity, RecordingMailer, data_store_from_env,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let auth = EmailLinkAuth::new(
//!     EmailLinkConfig::from_env(),
//!     data_store_from_env()?,
//!     Arc::new(InMemoryAccounts::new()),
//!     Arc::new(NoopExternalIdentity),
//!     Arc::new(RecordingMailer::new()),
//! );
//! auth.init().await?;
//!
//! let pending = auth
//!     .request_link(&Cancellation::new(), LinkRequest::new("alice@example.com", "phone-1"))
//!     .await?;
//! println!("confirmation code: {}", pending.confirmation_code);
//! # Ok(())
//! # }
//! ```

mod cancel;
mod config;
mod coordination;
mod metadata;
mod ratelimit;
mod signin;
mod storage;
mod token;
mod utils;

#[cfg(test)]
mod test_utils;

pub use cancel::Cancellation;
pub use config::{EmailLinkConfig, TokenConfig};

pub use coordination::{
    AccountRepository, CollaboratorError, EmailLinkAuth, EmailLinkError, ExternalIdentity,
    InMemoryAccounts, LinkMailer, LinkRequest, NoopExternalIdentity, PendingSignIn,
    RecordingMailer, SentMail, SignedIn,
};

pub use metadata::{
    AccountMetadata, EXTERNAL_ID_CLAIM, IDENTITY_CLAIM, PROVIDER_EXTERNAL,
    REGISTERED_WITH_PROVIDER_CLAIM,
};

pub use signin::{LoginId, SignInRecord, SignInStatus};

pub use storage::{
    DataStore, PostgresDataStore, SqliteDataStore, StorageError, TableNames, connect_data_store,
    data_store_from_env,
};

pub use token::{AccessClaims, RefreshClaims, TokenError, Tokens};

pub use utils::{UtilError, gen_random_string};
