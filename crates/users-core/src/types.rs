//! Core types for users-core

use chrono::{DateTime, Utc};
use claimgate_auth_core::{Claim, Principal};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_salt: String,
    pub claims: Vec<Claim>,
    pub active: bool,
    /// Current access token; `None` while logged out
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub access_token_expiration: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Request to create a new user
#[derive(Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl std::fmt::Debug for CreateUserRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUserRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

impl User {
    /// Create a new user ID
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// The principal view of this user, available while it holds an access token.
    pub fn to_principal(&self) -> Option<Principal> {
        let access_token = self.access_token.clone()?;
        let access_token_expiration = self.access_token_expiration?;
        Some(Principal {
            id: self.id.clone(),
            username: self.username.clone(),
            access_token,
            access_token_expiration,
            password_hash: self.password_hash.clone(),
            password_salt: self.password_salt.clone(),
            claims: self.claims.clone(),
        })
    }

    pub fn has_claim(&self, claim: &Claim) -> bool {
        self.claims.contains(claim)
    }
}
