//! # ClaimGate Users-Core
//!
//! User accounts and password login for ClaimGate.
//!
//! This crate provides:
//! - User storage behind the [`UserStore`] trait, with an in-memory store
//! - Password login issuing bearer tokens through `claimgate-auth-core`
//! - A REST API whose routes are guarded by required claims
//!
//! ## Architecture
//!
//! Users-Core owns the accounts and answers cache misses, while auth-core
//! owns the bearer token format, the credential cache and the authorization
//! decision for every request.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod types;
pub mod user_store;
pub mod validation;

use std::sync::Arc;

use claimgate_auth_core::AuthorizationEngine;
use tracing::{debug, info};

pub use auth::AuthenticationService;
pub use config::UsersConfig;
pub use error::{Error, Result};
pub use types::{CreateUserRequest, User};
pub use user_store::{InMemoryUserStore, UserStore};

/// Initialize the users-core service and create the configured seed users
pub async fn init(config: UsersConfig) -> Result<AuthenticationService> {
    config.validate()?;

    let engine = Arc::new(AuthorizationEngine::new(config.security.clone())?);
    let store = Arc::new(InMemoryUserStore::new());
    let service = AuthenticationService::new(store, engine, &config);

    for seed in &config.seed_users {
        match service.create_user(seed.clone()).await {
            Ok(user) => info!(username = %user.username, "Seed user created"),
            Err(Error::UserAlreadyExists(username)) => {
                debug!(%username, "Seed user already exists")
            }
            Err(e) => return Err(e),
        }
    }

    Ok(service)
}
