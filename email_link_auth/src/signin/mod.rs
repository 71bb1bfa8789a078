mod storage;
mod types;

pub use types::{LoginId, SignInRecord, SignInStatus};

pub(crate) use storage::SignInStore;
pub(crate) use types::{Finalization, IpRefund, NewSignIn};
