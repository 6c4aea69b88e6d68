//! Process-wide security configuration
//!
//! A [`SecurityConfig`] is built once at startup and handed to
//! [`AuthorizationEngine::new`](crate::AuthorizationEngine::new), which refuses
//! to start when the configuration is weak.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::{AuthError, Result};

/// Lowest accepted PBKDF2 iteration count.
pub const MIN_PASSWORD_ITERATIONS: u32 = 5000;

/// Lowest accepted length, in bytes, of the pepper and the bearer token key (128 bits).
pub const MIN_SECRET_BYTES: usize = 16;

/// Longest accepted `access_token_cache_duration`, in minutes (one year).
pub const MAX_CACHE_DURATION_MINUTES: u64 = 365 * 24 * 60;

/// Environment prefix used by [`SecurityConfig::from_env`].
pub const ENV_PREFIX: &str = "CLAIMGATE";

const DEFAULT_BRUTE_FORCE_MAX_DELAY_MS: u64 = 5000;

/// Security settings shared by the hasher, the token codec and the cache.
#[derive(Clone, Deserialize)]
pub struct SecurityConfig {
    /// PBKDF2 iteration count used for password digests
    pub password_iterations: u32,
    /// Process-wide secret mixed into every password digest
    pub password_pepper: String,
    /// Secret the bearer token encryption key is derived from
    pub bearer_token_key: String,
    /// Fixed prefix sealed in front of every access token
    pub access_token_header: String,
    /// Minutes an authenticated access token stays cached
    pub access_token_cache_duration: u64,
    /// Reset the cache countdown on every access (absolute expiry when false)
    #[serde(default = "default_sliding_expiration")]
    pub sliding_expiration: bool,
    /// Upper bound on a principal lookup after a cache miss
    #[serde(default)]
    pub resolver_timeout_ms: Option<u64>,
    /// Upper bound of the randomized delay applied after failed logins
    #[serde(default = "default_brute_force_max_delay_ms")]
    pub brute_force_max_delay_ms: u64,
}

fn default_sliding_expiration() -> bool {
    true
}

fn default_brute_force_max_delay_ms() -> u64 {
    DEFAULT_BRUTE_FORCE_MAX_DELAY_MS
}

impl SecurityConfig {
    pub fn new(
        password_iterations: u32,
        password_pepper: impl Into<String>,
        bearer_token_key: impl Into<String>,
        access_token_header: impl Into<String>,
        access_token_cache_duration: u64,
    ) -> Self {
        Self {
            password_iterations,
            password_pepper: password_pepper.into(),
            bearer_token_key: bearer_token_key.into(),
            access_token_header: access_token_header.into(),
            access_token_cache_duration,
            sliding_expiration: default_sliding_expiration(),
            resolver_timeout_ms: None,
            brute_force_max_delay_ms: DEFAULT_BRUTE_FORCE_MAX_DELAY_MS,
        }
    }

    /// Use absolute instead of sliding cache expiration
    pub fn with_absolute_expiration(mut self) -> Self {
        self.sliding_expiration = false;
        self
    }

    pub fn with_resolver_timeout(mut self, timeout: Duration) -> Self {
        self.resolver_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_brute_force_max_delay(mut self, max_delay: Duration) -> Self {
        self.brute_force_max_delay_ms = max_delay.as_millis() as u64;
        self
    }

    /// Load from `CLAIMGATE_*` environment variables
    /// (e.g. `CLAIMGATE_PASSWORD_PEPPER`).
    pub fn from_env() -> Result<Self> {
        let settings = Config::builder().add_source(env_source()).build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a configuration file, with environment variables layered on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would silently weaken security.
    pub fn validate(&self) -> Result<()> {
        if self.password_iterations < MIN_PASSWORD_ITERATIONS {
            return Err(AuthError::ConfigError(format!(
                "password_iterations must be at least {}, got {}",
                MIN_PASSWORD_ITERATIONS, self.password_iterations
            )));
        }
        if self.password_pepper.len() < MIN_SECRET_BYTES {
            return Err(AuthError::ConfigError(format!(
                "password_pepper must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }
        if self.bearer_token_key.len() < MIN_SECRET_BYTES {
            return Err(AuthError::ConfigError(format!(
                "bearer_token_key must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }
        if self.access_token_header.is_empty() {
            return Err(AuthError::ConfigError(
                "access_token_header must not be empty".to_string(),
            ));
        }
        if self.access_token_cache_duration == 0 {
            return Err(AuthError::ConfigError(
                "access_token_cache_duration must be at least one minute".to_string(),
            ));
        }
        if self.access_token_cache_duration > MAX_CACHE_DURATION_MINUTES {
            return Err(AuthError::ConfigError(format!(
                "access_token_cache_duration must not exceed {} minutes",
                MAX_CACHE_DURATION_MINUTES
            )));
        }
        Ok(())
    }

    /// Cache lifetime of an authenticated access token
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_cache_duration.saturating_mul(60))
    }

    pub fn resolver_timeout(&self) -> Option<Duration> {
        self.resolver_timeout_ms.map(Duration::from_millis)
    }

    pub fn brute_force_max_delay(&self) -> Duration {
        Duration::from_millis(self.brute_force_max_delay_ms)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("password_iterations", &self.password_iterations)
            .field("password_pepper", &"<redacted>")
            .field("bearer_token_key", &"<redacted>")
            .field("access_token_header", &"<redacted>")
            .field("access_token_cache_duration", &self.access_token_cache_duration)
            .field("sliding_expiration", &self.sliding_expiration)
            .field("resolver_timeout_ms", &self.resolver_timeout_ms)
            .field("brute_force_max_delay_ms", &self.brute_force_max_delay_ms)
            .finish()
    }
}
