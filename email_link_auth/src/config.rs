//! Central configuration for the email_link_auth crate
//!
//! The engine never reads process state on its own: an [`EmailLinkConfig`]
//! is built once (usually with [`EmailLinkConfig::from_env`]) and handed to
//! [`crate::EmailLinkAuth::new`].

use chrono::Duration;
use std::env;

const DEFAULT_SECRET: &str = "default_secret_key_change_in_production";

/// Signing secret and lifetime for one kind of token
#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub secret: Vec<u8>,
    pub ttl: Duration,
}

impl TokenConfig {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmailLinkConfig {
    /// Wrong confirmation codes tolerated before the record is blocked
    pub max_wrong_attempts: i64,
    /// How long a record stays blocked once the threshold is crossed
    pub block_duration: Duration,
    /// Link requests allowed per client IP within one login session window
    pub max_attempts_per_ip: i64,
    /// Length of the window that defines a login session number
    pub same_ip_rate_check_period: Duration,
    /// Number of digits in a confirmation code
    pub confirmation_code_length: usize,
    /// Token returned to the requesting device, used for status polling
    pub login_session: TokenConfig,
    /// Token embedded in the emailed link
    pub email_validation: TokenConfig,
    pub access_token: TokenConfig,
    pub refresh_token: TokenConfig,
    /// `iss` claim written to and required from every token
    pub issuer: String,
    /// Page that receives the emailed link; the token is appended as a query parameter
    pub link_base_url: String,
    /// Prefix of user ids minted by this system, as opposed to external providers
    pub native_id_prefix: String,
    pub table_prefix: String,
}

impl Default for EmailLinkConfig {
    fn default() -> Self {
        Self {
            max_wrong_attempts: 10,
            block_duration: Duration::minutes(10),
            max_attempts_per_ip: 10,
            same_ip_rate_check_period: Duration::hours(1),
            confirmation_code_length: 6,
            login_session: TokenConfig::new(DEFAULT_SECRET, Duration::minutes(10)),
            email_validation: TokenConfig::new(DEFAULT_SECRET, Duration::minutes(10)),
            access_token: TokenConfig::new(DEFAULT_SECRET, Duration::hours(1)),
            refresh_token: TokenConfig::new(DEFAULT_SECRET, Duration::days(30)),
            issuer: "email-link-auth".to_string(),
            link_base_url: "http://localhost:3000/auth/email-link".to_string(),
            native_id_prefix: "usr_".to_string(),
            table_prefix: "el_".to_string(),
        }
    }
}

impl EmailLinkConfig {
    /// Build a configuration from environment variables, falling back to
    /// [`EmailLinkConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_wrong_attempts: env_parse(
                "EMAIL_LINK_MAX_WRONG_ATTEMPTS",
                defaults.max_wrong_attempts,
            ),
            block_duration: env_seconds("EMAIL_LINK_BLOCK_DURATION", defaults.block_duration),
            max_attempts_per_ip: env_parse(
                "EMAIL_LINK_MAX_ATTEMPTS_PER_IP",
                defaults.max_attempts_per_ip,
            ),
            same_ip_rate_check_period: env_seconds(
                "EMAIL_LINK_SAME_IP_RATE_CHECK_PERIOD",
                defaults.same_ip_rate_check_period,
            ),
            confirmation_code_length: env_parse(
                "EMAIL_LINK_CONFIRMATION_CODE_LENGTH",
                defaults.confirmation_code_length,
            ),
            login_session: env_token(
                "EMAIL_LINK_LOGIN_SESSION_SECRET",
                "EMAIL_LINK_LOGIN_SESSION_TTL",
                defaults.login_session,
            ),
            email_validation: env_token(
                "EMAIL_LINK_EMAIL_VALIDATION_SECRET",
                "EMAIL_LINK_EMAIL_VALIDATION_TTL",
                defaults.email_validation,
            ),
            access_token: env_token(
                "EMAIL_LINK_ACCESS_TOKEN_SECRET",
                "EMAIL_LINK_ACCESS_TOKEN_TTL",
                defaults.access_token,
            ),
            refresh_token: env_token(
                "EMAIL_LINK_REFRESH_TOKEN_SECRET",
                "EMAIL_LINK_REFRESH_TOKEN_TTL",
                defaults.refresh_token,
            ),
            issuer: env::var("EMAIL_LINK_ISSUER").unwrap_or(defaults.issuer),
            link_base_url: env::var("EMAIL_LINK_BASE_URL").unwrap_or(defaults.link_base_url),
            native_id_prefix: env::var("EMAIL_LINK_NATIVE_ID_PREFIX")
                .unwrap_or(defaults.native_id_prefix),
            table_prefix: env::var("DB_TABLE_PREFIX").unwrap_or(defaults.table_prefix),
        }
    }

    /// Login session number for `timestamp`: the index of the rate-limit
    /// window the timestamp falls into.
    pub(crate) fn login_session_number(&self, timestamp: i64) -> i64 {
        let period = self.same_ip_rate_check_period.num_seconds().max(1);
        timestamp / period
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_seconds(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .map(Duration::seconds)
        .unwrap_or(default)
}

fn env_token(secret_key: &str, ttl_key: &str, default: TokenConfig) -> TokenConfig {
    let secret = match env::var(secret_key) {
        Ok(secret) => secret.into_bytes(),
        Err(_) => {
            tracing::warn!("{} is not set, using the built-in default secret", secret_key);
            default.secret
        }
    };
    TokenConfig {
        secret,
        ttl: env_seconds(ttl_key, default.ttl),
    }
}
