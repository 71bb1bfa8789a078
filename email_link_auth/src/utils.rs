use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ring::rand::SecureRandom;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum UtilError {
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Invalid format: {0}")]
    Format(String),
}

pub(crate) fn base64url_encode(input: Vec<u8>) -> Result<String, UtilError> {
    Ok(URL_SAFE_NO_PAD.encode(input))
}

/// Random URL-safe string built from `len` bytes of OS randomness.
pub fn gen_random_string(len: usize) -> Result<String, UtilError> {
    let rng = ring::rand::SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| UtilError::Crypto("Failed to generate random string".to_string()))?;
    let encoded = base64url_encode(bytes)
        .map_err(|_| UtilError::Crypto("Failed to encode random string".to_string()))?;
    Ok(encoded)
}

/// Numeric confirmation code of exactly `digits` digits, leading zeros kept.
///
/// Each digit is drawn by rejection sampling so that every value in
/// `0..10^digits` is equally likely.
pub(crate) fn gen_confirmation_code(digits: usize) -> Result<String, UtilError> {
    if digits == 0 {
        return Err(UtilError::Format(
            "Confirmation code length must be positive".to_string(),
        ));
    }

    let rng = ring::rand::SystemRandom::new();
    let mut code = String::with_capacity(digits);
    let mut byte = [0u8; 1];

    while code.len() < digits {
        rng.fill(&mut byte)
            .map_err(|_| UtilError::Crypto("Failed to generate confirmation code".to_string()))?;
        // 250 is the largest multiple of 10 below 256
        if byte[0] < 250 {
            code.push(char::from(b'0' + byte[0] % 10));
        }
    }

    Ok(code)
}

/// Normalizes an email address for use as part of a record key.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
