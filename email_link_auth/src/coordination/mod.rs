//! Sign-in flow coordination
//!
//! [`EmailLinkAuth`] ties the sign-in store, the per-IP limiter and the
//! collaborators together. Each public operation lives in its own file:
//! - `link`: issue or renew a sign-in and mail the link
//! - `signin`: complete a sign-in from the link and a confirmation code
//! - `status`: poll for the outcome from the requesting device
//!
//! The remaining files hold the steps those operations share.

mod collaborators;
mod engine;
mod errors;
mod finalize;
mod link;
mod migration;
mod records;
mod signin;
mod status;
mod types;
mod verify;

pub use collaborators::{
    AccountRepository, CollaboratorError, ExternalIdentity, InMemoryAccounts, LinkMailer,
    NoopExternalIdentity, RecordingMailer, SentMail,
};
pub use engine::EmailLinkAuth;
pub use errors::EmailLinkError;
pub use types::{LinkRequest, PendingSignIn, SignedIn};
