//! Error types for authentication operations
//!
//! Token and claim verification never surface here: a forged, stale or
//! malformed token is an expected negative outcome and is reported through
//! [`AuthDecision`](crate::AuthDecision) or `Option`. These errors cover
//! startup misconfiguration and failures while minting new tokens.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Principal provider error: {0}")]
    ProviderError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<::config::ConfigError> for AuthError {
    fn from(err: ::config::ConfigError) -> Self {
        AuthError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
