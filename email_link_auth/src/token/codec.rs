//! Signing and verification of the engine's stateless tokens
//!
//! All tokens are HS256 JWTs. A valid signature and an unexpired `exp` only
//! prove the token was issued by this engine; callers still have to
//! corroborate the claims against the sign-in record.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Serialize, de::DeserializeOwned};

use crate::config::EmailLinkConfig;
use crate::metadata::AccountMetadata;

use super::errors::TokenError;
use super::types::{AccessClaims, Envelope, RefreshClaims, TokenKind, Tokens};

pub(crate) fn issue<C: Serialize>(
    kind: TokenKind,
    claims: C,
    issuer: &str,
    secret: &[u8],
    ttl: Duration,
    issued_at: DateTime<Utc>,
) -> Result<String, TokenError> {
    let envelope = Envelope {
        iss: issuer.to_string(),
        aud: kind.audience().to_string(),
        iat: issued_at.timestamp(),
        exp: (issued_at + ttl).timestamp(),
        claims,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &envelope,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| TokenError::Encode(e.to_string()))
}

pub(crate) fn parse<C: DeserializeOwned>(
    kind: TokenKind,
    token: &str,
    issuer: &str,
    secret: &[u8],
) -> Result<Envelope<C>, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_audience(&[kind.audience()]);
    validation.set_issuer(&[issuer]);

    let data = jsonwebtoken::decode::<Envelope<C>>(
        token,
        &DecodingKey::from_secret(secret),
        &validation,
    )?;

    Ok(data.claims)
}

/// Mint the access and refresh token pair for a finished sign-in.
pub(crate) fn generate_tokens(
    config: &EmailLinkConfig,
    issued_at: DateTime<Utc>,
    user_id: &str,
    email: &str,
    device_unique_id: &str,
    seq: i64,
    metadata: &AccountMetadata,
) -> Result<Tokens, TokenError> {
    let access = AccessClaims {
        sub: user_id.to_string(),
        email: email.to_string(),
        device_unique_id: device_unique_id.to_string(),
        seq,
        metadata: metadata.clone(),
    };
    let refresh = RefreshClaims {
        sub: user_id.to_string(),
        email: email.to_string(),
        device_unique_id: device_unique_id.to_string(),
        seq,
    };

    Ok(Tokens {
        access_token: issue(
            TokenKind::Access,
            access,
            &config.issuer,
            &config.access_token.secret,
            config.access_token.ttl,
            issued_at,
        )?,
        refresh_token: issue(
            TokenKind::Refresh,
            refresh,
            &config.issuer,
            &config.refresh_token.secret,
            config.refresh_token.ttl,
            issued_at,
        )?,
    })
}
