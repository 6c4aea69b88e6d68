//! Authorization decisions
//!
//! [`AuthorizationEngine`] walks a request through:
//!
//! 1. extract the `Bearer` credential from the `Authorization` header
//! 2. open it with the [`TokenCodec`] to recover the access token
//! 3. look the access token up in the [`CredentialCache`], falling back to
//!    the [`PrincipalResolver`] on a miss and re-populating the cache
//! 4. check the required [`Claim`], if any
//!
//! Every failure along the way collapses into [`AuthDecision::Unauthenticated`]
//! or [`AuthDecision::Forbidden`]; nothing about the cryptography or the
//! cache leaks to the caller.

use std::future::Future;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::throttle;
use crate::{
    AuthDecision, Claim, CredentialCache, Credentials, PasswordHasher, Principal, Result,
    SecurityConfig, TokenCodec, TokenResponse,
};

/// Authentication scheme accepted in the `Authorization` header (exact match)
pub const BEARER_SCHEME: &str = "Bearer";

/// Looks up the principal an access token was issued to.
///
/// Only called on a cache miss, so it may be slow (e.g. a database query).
/// Returning `Ok(None)` or an error both result in an unauthenticated request.
#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    async fn resolve(&self, access_token: &str) -> Result<Option<Principal>>;
}

/// Any `Fn(String) -> impl Future<Output = Result<Option<Principal>>>` is a resolver.
///
/// The returned future must be `'static`; clone what it needs into it.
#[async_trait]
impl<F, Fut> PrincipalResolver for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Principal>>> + Send + 'static,
{
    async fn resolve(&self, access_token: &str) -> Result<Option<Principal>> {
        (self)(access_token.to_string()).await
    }
}

/// Result of [`AuthorizationEngine::authorize`]
#[derive(Debug, Clone, PartialEq)]
pub struct Authorization {
    pub decision: AuthDecision,
    /// The access token recovered from the bearer token, once authenticated.
    pub access_token: Option<String>,
    /// A freshly minted bearer token, present when the cache was refilled
    /// from the resolver. Integrators may hand it back to the client.
    pub refreshed: Option<TokenResponse>,
}

impl Authorization {
    fn denied(decision: AuthDecision) -> Self {
        Self {
            decision,
            access_token: None,
            refreshed: None,
        }
    }
}

/// Extract the credential from an `Authorization` header value.
///
/// The scheme must be exactly `Bearer`; anything else yields `None`.
pub fn bearer_credential(authorization: &str) -> Option<&str> {
    let (scheme, parameter) = authorization.trim().split_once(char::is_whitespace)?;
    if scheme != BEARER_SCHEME {
        return None;
    }
    let parameter = parameter.trim();
    (!parameter.is_empty()).then_some(parameter)
}

/// Claim-based request authorization over an owned credential cache.
pub struct AuthorizationEngine {
    config: SecurityConfig,
    codec: TokenCodec,
    hasher: PasswordHasher,
    cache: CredentialCache,
}

impl AuthorizationEngine {
    /// Build an engine with its own cache. Fails on weak configuration.
    pub fn new(config: SecurityConfig) -> Result<Self> {
        Self::with_cache(config, CredentialCache::new())
    }

    /// Build an engine around an existing cache handle.
    pub fn with_cache(config: SecurityConfig, cache: CredentialCache) -> Result<Self> {
        if let Err(e) = config.validate() {
            error!(error = %e, "Refusing to start with invalid security configuration");
            return Err(e);
        }

        let codec = TokenCodec::from_config(&config)?;
        let hasher = PasswordHasher::from_config(&config)?;

        info!(
            cache_minutes = config.access_token_cache_duration,
            sliding = config.sliding_expiration,
            "Authorization engine configured"
        );

        Ok(Self {
            config,
            codec,
            hasher,
            cache,
        })
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Seal an access token into a bearer token
    pub fn generate_bearer_token(&self, access_token: &str) -> Result<String> {
        self.codec.encode(access_token)
    }

    /// Extract and open the bearer token carried by an `Authorization` header.
    pub fn access_token(&self, authorization: Option<&str>) -> Option<String> {
        let bearer = bearer_credential(authorization?)?;
        self.codec
            .decode(bearer)
            .filter(|access_token| !access_token.trim().is_empty())
    }

    /// Cache the principal's claims and mint a bearer token for it.
    ///
    /// Any previous cache entry for the access token is dropped first.
    /// Returns `Ok(None)` when the access token has already expired.
    pub fn login(&self, principal: &Principal) -> Result<Option<TokenResponse>> {
        self.logout(&principal.access_token);

        let remaining = principal.access_token_expiration - Utc::now();
        if remaining <= chrono::Duration::zero() {
            debug!(principal = %principal.id, "Access token already expired, not caching");
            return Ok(None);
        }
        let expires_in = remaining.num_seconds();

        self.cache.add(
            &principal.access_token,
            Credentials::from_principal(principal),
            self.config.cache_ttl(),
            self.config.sliding_expiration,
        );

        let bearer_token = self.codec.encode(&principal.access_token)?;
        debug!(principal = %principal.id, expires_in, "Principal logged in");
        Ok(Some(TokenResponse::bearer(bearer_token, expires_in)))
    }

    /// Drop the cached credentials for an access token.
    ///
    /// Invalidating the token in the backing store is up to the caller.
    pub fn logout(&self, access_token: &str) {
        self.cache.remove(access_token);
    }

    /// Replace the cached claims of a principal that is currently logged in.
    ///
    /// Returns `false`, caching nothing, if no live entry exists for its
    /// access token.
    pub fn update_claims(&self, principal: &Principal) -> bool {
        self.cache
            .replace(&principal.access_token, Credentials::from_principal(principal))
    }

    /// Whether the credentials cached for `access_token` include `claim`.
    pub fn has_claim(&self, access_token: &str, claim: &Claim) -> bool {
        self.cache
            .get(access_token)
            .is_some_and(|credentials| credentials.has_claim(claim))
    }

    /// Whether `access_token` belongs to an authenticated principal.
    pub async fn valid_access_token<R>(&self, access_token: &str, resolver: &R) -> bool
    where
        R: PrincipalResolver + ?Sized,
    {
        self.authenticate(access_token, resolver).await.is_some()
    }

    /// Classify a request and report any bearer token minted on the way.
    pub async fn authorize<R>(
        &self,
        authorization: Option<&str>,
        required: Option<&Claim>,
        resolver: &R,
    ) -> Authorization
    where
        R: PrincipalResolver + ?Sized,
    {
        let Some(access_token) = self.access_token(authorization) else {
            debug!("No valid bearer token presented");
            return Authorization::denied(AuthDecision::Unauthenticated);
        };

        let Some((credentials, refreshed)) = self.authenticate(&access_token, resolver).await
        else {
            debug!("Access token not recognized");
            return Authorization::denied(AuthDecision::Unauthenticated);
        };

        let decision = match required {
            None => AuthDecision::Authorized,
            Some(claim) if credentials.has_claim(claim) => AuthDecision::Authorized,
            Some(claim) => {
                debug!(claim = %claim, "Required claim missing");
                AuthDecision::Forbidden
            }
        };

        Authorization {
            decision,
            access_token: Some(access_token),
            refreshed,
        }
    }

    /// Classify a request as authorized, unauthenticated or forbidden.
    pub async fn is_authorized<R>(
        &self,
        authorization: Option<&str>,
        required: Option<&Claim>,
        resolver: &R,
    ) -> AuthDecision
    where
        R: PrincipalResolver + ?Sized,
    {
        self.authorize(authorization, required, resolver).await.decision
    }

    /// Randomized delay for failed authentication paths.
    pub async fn mitigate_brute_force(&self) {
        throttle::mitigate_brute_force(self.config.brute_force_max_delay()).await;
    }

    async fn authenticate<R>(
        &self,
        access_token: &str,
        resolver: &R,
    ) -> Option<(Credentials, Option<TokenResponse>)>
    where
        R: PrincipalResolver + ?Sized,
    {
        if access_token.trim().is_empty() {
            return None;
        }

        if let Some(credentials) = self.cache.get(access_token) {
            if !credentials.is_expired_at(Utc::now()) {
                return Some((credentials, None));
            }
            debug!("Cached access token expired, evicting");
            self.cache.remove(access_token);
        }

        let principal = self.resolve(access_token, resolver).await?;
        if principal.access_token != access_token {
            warn!(principal = %principal.id, "Resolver returned a principal for a different access token");
            return None;
        }

        match self.login(&principal) {
            Ok(Some(refreshed)) => Some((Credentials::from_principal(&principal), Some(refreshed))),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to mint refreshed bearer token");
                None
            }
        }
    }

    async fn resolve<R>(&self, access_token: &str, resolver: &R) -> Option<Principal>
    where
        R: PrincipalResolver + ?Sized,
    {
        let lookup = resolver.resolve(access_token);
        let outcome = match self.config.resolver_timeout() {
            Some(limit) => match tokio::time::timeout(limit, lookup).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "Principal lookup timed out");
                    return None;
                }
            },
            None => lookup.await,
        };

        match outcome {
            Ok(principal) => principal,
            Err(e) => {
                warn!(error = %e, "Principal lookup failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_credential() {
        assert_eq!(bearer_credential("Bearer Foo"), Some("Foo"));
        assert_eq!(bearer_credential("  Bearer   Foo  "), Some("Foo"));
        assert_eq!(bearer_credential("Basic xyz"), None);
        assert_eq!(bearer_credential("Basic"), None);
        assert_eq!(bearer_credential("bearer Foo"), None);
        assert_eq!(bearer_credential("BEARER Foo"), None);
        assert_eq!(bearer_credential("Bearer"), None);
        assert_eq!(bearer_credential("Bearer    "), None);
        assert_eq!(bearer_credential(""), None);
    }
}
