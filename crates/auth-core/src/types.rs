//! Core types for auth-core

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The only token type issued in token responses
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// A `(type, value)` permission marker. Equality is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.claim_type, self.value)
    }
}

/// An authenticated user as seen by the engine.
///
/// Owned by whatever store resolves access tokens; the engine only reads it.
#[derive(Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub username: String,
    pub access_token: String,
    pub access_token_expiration: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(skip_serializing, default)]
    pub password_salt: String,
    pub claims: Vec<Claim>,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("access_token_expiration", &self.access_token_expiration)
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

/// Cache payload: the part of a [`Principal`] needed to authorize requests.
///
/// Password material never enters the cache. The claim set is copied on
/// construction and cannot be mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    access_token_expiration: DateTime<Utc>,
    claims: Arc<[Claim]>,
}

impl Credentials {
    pub fn from_principal(principal: &Principal) -> Self {
        Self {
            access_token_expiration: principal.access_token_expiration,
            claims: principal.claims.iter().cloned().collect(),
        }
    }

    pub fn access_token_expiration(&self) -> DateTime<Utc> {
        self.access_token_expiration
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn has_claim(&self, claim: &Claim) -> bool {
        self.claims.iter().any(|c| c == claim)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.access_token_expiration <= now
    }
}

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Authorized,
    Unauthenticated,
    Forbidden,
}

impl AuthDecision {
    /// HTTP status an integrator should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            AuthDecision::Authorized => 200,
            AuthDecision::Unauthenticated => 401,
            AuthDecision::Forbidden => 403,
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthDecision::Authorized)
    }
}

/// Token endpoint response (RFC 6749 section 5.1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The bearer token, not the raw access token
    pub access_token: String,
    pub token_type: String,
    /// Remaining lifetime in seconds
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn bearer(access_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in,
        }
    }
}

/// Resource owner password credentials (RFC 6749 section 4.3.2)
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessTokenRequest {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AccessTokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
