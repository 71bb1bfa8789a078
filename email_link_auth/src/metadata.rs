//! Account metadata: the structured claims merged into access tokens
//!
//! Metadata is owned by the identity subsystem and keyed by user id. The
//! sign-in engine only touches it while finalizing, in the same atomic write
//! that advances the issued-token sequence.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claim holding the resolved user id
pub const IDENTITY_CLAIM: &str = "native_id";
/// Claim holding the id assigned by an external identity provider
pub const EXTERNAL_ID_CLAIM: &str = "external_id";
/// Claim naming the provider an account was originally registered with
pub const REGISTERED_WITH_PROVIDER_CLAIM: &str = "registered_with_provider";
/// Value of [`REGISTERED_WITH_PROVIDER_CLAIM`] for externally registered accounts
pub const PROVIDER_EXTERNAL: &str = "external";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountMetadata(Map<String, Value>);

impl AccountMetadata {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// External provider id, if the account has one
    pub fn external_id(&self) -> Option<&str> {
        self.get_str(EXTERNAL_ID_CLAIM)
    }

    pub(crate) fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub(crate) fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self(serde_json::from_str(json)?))
    }
}

/// Compute the metadata to store for `user_id` after a successful sign-in.
///
/// Stored claims are kept; freshly computed claims win on conflict. The
/// identity claim always becomes `user_id`. The provider claim is
/// back-filled only when it is absent and the account carries an external
/// id that, like `user_id` itself, is not a native id.
pub(crate) fn merge_for_sign_in(
    stored: Option<&AccountMetadata>,
    user_id: &str,
    native_id_prefix: &str,
) -> AccountMetadata {
    let mut merged = stored.cloned().unwrap_or_default();

    let backfill_provider = !merged.contains(REGISTERED_WITH_PROVIDER_CLAIM)
        && merged
            .external_id()
            .is_some_and(|external_id| !external_id.starts_with(native_id_prefix))
        && !user_id.starts_with(native_id_prefix);

    merged.insert(IDENTITY_CLAIM, user_id);
    if backfill_provider {
        merged.insert(REGISTERED_WITH_PROVIDER_CLAIM, PROVIDER_EXTERNAL);
    }

    merged
}
