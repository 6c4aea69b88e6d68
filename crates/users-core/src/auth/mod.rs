//! Authentication service
//!
//! Password logins and account lifecycle on top of a [`UserStore`] and a
//! shared [`AuthorizationEngine`]. The service is also the engine's
//! [`PrincipalResolver`]: a cache miss is answered from the store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use claimgate_auth_core::{
    AccessTokenRequest, AuthError, AuthorizationEngine, Claim, Principal, PrincipalResolver,
    TokenResponse, generate_access_token, generate_salt,
};
use tracing::{debug, info, warn};

use crate::config::UsersConfig;
use crate::validation::{PasswordValidator, validate_claims, validate_create_user};
use crate::{CreateUserRequest, Error, Result, User, UserStore};

/// Authentication service
pub struct AuthenticationService {
    store: Arc<dyn UserStore>,
    engine: Arc<AuthorizationEngine>,
    passwords: PasswordValidator,
    access_token_ttl: chrono::Duration,
}

impl AuthenticationService {
    pub fn new(
        store: Arc<dyn UserStore>,
        engine: Arc<AuthorizationEngine>,
        config: &UsersConfig,
    ) -> Self {
        Self {
            store,
            engine,
            passwords: PasswordValidator::new(config.password.clone()),
            access_token_ttl: config.access_token_ttl(),
        }
    }

    pub fn engine(&self) -> &Arc<AuthorizationEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User> {
        validate_create_user(&request, &self.passwords)?;
        if self.store.get_user_by_username(&request.username).await?.is_some() {
            return Err(Error::UserAlreadyExists(request.username));
        }

        let password_salt = generate_salt();
        let password_hash = self
            .hash_password(request.password, password_salt.clone())
            .await?;

        let now = Utc::now();
        let user = self
            .store
            .create_user(User {
                id: User::new_id(),
                username: request.username,
                password_hash,
                password_salt,
                claims: request.claims,
                active: true,
                access_token: None,
                access_token_expiration: None,
                created_at: now,
                updated_at: now,
                last_login: None,
            })
            .await?;

        info!(user_id = %user.id, username = %user.username, "User created");
        Ok(user)
    }

    /// Exchange a username and password for a bearer token.
    ///
    /// Every failure looks the same to the caller and is answered only after
    /// a randomized delay.
    pub async fn authenticate_password(&self, request: &AccessTokenRequest) -> Result<TokenResponse> {
        let user = self.store.get_user_by_username(&request.username).await?;

        let verified = match &user {
            Some(user) if user.active => {
                self.verify_password(request.password.clone(), user).await?
            }
            _ => {
                // Unknown or disabled accounts still pay for one digest.
                self.hash_password(request.password.clone(), generate_salt())
                    .await?;
                false
            }
        };

        match user {
            Some(user) if verified => self.issue_access_token(user).await,
            _ => {
                warn!(username = %request.username, "Failed password login");
                self.engine.mitigate_brute_force().await;
                Err(Error::InvalidCredentials)
            }
        }
    }

    /// End the session holding `access_token`.
    ///
    /// The store forgets the token before the cache entry is dropped, so a
    /// concurrent cache miss cannot resolve it again.
    pub async fn logout(&self, access_token: &str) -> Result<()> {
        if let Some(mut user) = self.store.get_user_by_access_token(access_token).await? {
            user.access_token = None;
            user.access_token_expiration = None;
            let user = self.store.update_user(user).await?;
            info!(user_id = %user.id, "User logged out");
        }
        self.engine.logout(access_token);
        Ok(())
    }

    /// Replace a user's claims; a live session sees them on its next request.
    pub async fn update_claims(&self, user_id: &str, claims: Vec<Claim>) -> Result<User> {
        validate_claims(&claims)?;
        let mut user = self.require_user(user_id).await?;
        user.claims = claims;
        let user = self.store.update_user(user).await?;

        if let Some(principal) = user.to_principal() {
            let cached = self.engine.update_claims(&principal);
            debug!(user_id = %user.id, cached, "Claims updated");
        }
        Ok(user)
    }

    /// Enable or disable an account. Disabling ends its session.
    pub async fn set_active(&self, user_id: &str, active: bool) -> Result<User> {
        let mut user = self.require_user(user_id).await?;
        user.active = active;
        let revoked = if active {
            None
        } else {
            user.access_token_expiration = None;
            user.access_token.take()
        };
        let user = self.store.update_user(user).await?;
        if let Some(access_token) = revoked {
            self.engine.logout(&access_token);
        }
        info!(user_id = %user.id, active, "User activation changed");
        Ok(user)
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        let user = self.require_user(user_id).await?;
        self.store.delete_user(user_id).await?;
        if let Some(access_token) = &user.access_token {
            self.engine.logout(access_token);
        }
        info!(user_id, "User deleted");
        Ok(())
    }

    /// The user holding `access_token`, if any.
    pub async fn current_user(&self, access_token: &str) -> Result<Option<User>> {
        self.store.get_user_by_access_token(access_token).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.store.list_users().await
    }

    async fn require_user(&self, user_id: &str) -> Result<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))
    }

    async fn issue_access_token(&self, mut user: User) -> Result<TokenResponse> {
        let previous = user.access_token.take();

        let now = Utc::now();
        user.access_token = Some(generate_access_token());
        user.access_token_expiration = Some(now + self.access_token_ttl);
        user.last_login = Some(now);
        let user = self.store.update_user(user).await?;
        if let Some(previous) = previous {
            self.engine.logout(&previous);
        }

        let principal = user
            .to_principal()
            .ok_or_else(|| Error::Internal("access token missing after login".to_string()))?;
        let response = self
            .engine
            .login(&principal)?
            .ok_or_else(|| Error::Internal("access token expired on issue".to_string()))?;

        info!(user_id = %user.id, expires_in = response.expires_in, "Access token issued");
        Ok(response)
    }

    async fn hash_password(&self, password: String, salt: String) -> Result<String> {
        let hasher = self.engine.hasher().clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password, &salt))
            .await
            .map_err(|e| Error::Internal(format!("Password hashing task failed: {}", e)))
    }

    async fn verify_password(&self, password: String, user: &User) -> Result<bool> {
        let hasher = self.engine.hasher().clone();
        let salt = user.password_salt.clone();
        let digest = user.password_hash.clone();
        tokio::task::spawn_blocking(move || hasher.verify_digest(&password, &salt, &digest))
            .await
            .map_err(|e| Error::Internal(format!("Password verification task failed: {}", e)))
    }
}

#[async_trait]
impl PrincipalResolver for AuthenticationService {
    async fn resolve(&self, access_token: &str) -> claimgate_auth_core::Result<Option<Principal>> {
        let user = self
            .store
            .get_user_by_access_token(access_token)
            .await
            .map_err(|e| AuthError::ProviderError(e.to_string()))?;
        Ok(user
            .filter(|user| user.active)
            .and_then(|user| user.to_principal()))
    }
}

impl std::fmt::Debug for AuthenticationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationService")
            .field("engine", &self.engine)
            .field("access_token_ttl", &self.access_token_ttl)
            .finish_non_exhaustive()
    }
}
