mod codec;
mod errors;
mod types;

pub use errors::TokenError;
pub use types::{AccessClaims, RefreshClaims, Tokens};

pub(crate) use codec::{generate_tokens, issue, parse};
pub(crate) use types::{LoginFlowClaims, LoginSessionClaims, TokenKind};
