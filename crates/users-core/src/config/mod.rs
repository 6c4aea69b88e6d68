//! Configuration for users-core

use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File};
use claimgate_auth_core::SecurityConfig;
use claimgate_auth_core::config::ENV_PREFIX;
use serde::Deserialize;

use crate::validation::PasswordPolicy;
use crate::{CreateUserRequest, Error, Result};

/// Longest accepted `access_token_ttl_minutes` (one year)
pub const MAX_ACCESS_TOKEN_TTL_MINUTES: u64 = 365 * 24 * 60;

/// Main configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UsersConfig {
    pub security: SecurityConfig,
    #[serde(default = "default_api_bind_address")]
    pub api_bind_address: String,
    /// Lifetime of an access token issued by a password login
    #[serde(default = "default_access_token_ttl_minutes")]
    pub access_token_ttl_minutes: u64,
    /// Period of the background sweep over the credential cache; 0 disables it
    #[serde(default = "default_cache_sweep_interval_secs")]
    pub cache_sweep_interval_secs: u64,
    #[serde(default)]
    pub password: PasswordPolicy,
    /// Accounts created at startup when missing
    #[serde(default)]
    pub seed_users: Vec<CreateUserRequest>,
}

fn default_api_bind_address() -> String {
    "127.0.0.1:8081".to_string()
}

fn default_access_token_ttl_minutes() -> u64 {
    60
}

fn default_cache_sweep_interval_secs() -> u64 {
    60
}

impl UsersConfig {
    pub fn new(security: SecurityConfig) -> Self {
        Self {
            security,
            api_bind_address: default_api_bind_address(),
            access_token_ttl_minutes: default_access_token_ttl_minutes(),
            cache_sweep_interval_secs: default_cache_sweep_interval_secs(),
            password: PasswordPolicy::default(),
            seed_users: Vec::new(),
        }
    }

    /// Load configuration from `CLAIMGATE_*` environment variables
    /// (e.g. `CLAIMGATE_SECURITY__PASSWORD_PEPPER`).
    pub fn from_env() -> Result<Self> {
        let settings = Config::builder().add_source(env_source()).build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, with environment variables layered on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.security.validate()?;
        if self.access_token_ttl_minutes == 0 {
            return Err(Error::Config(
                "access_token_ttl_minutes must be at least one minute".to_string(),
            ));
        }
        if self.access_token_ttl_minutes > MAX_ACCESS_TOKEN_TTL_MINUTES {
            return Err(Error::Config(format!(
                "access_token_ttl_minutes must not exceed {}",
                MAX_ACCESS_TOKEN_TTL_MINUTES
            )));
        }
        Ok(())
    }

    pub fn access_token_ttl(&self) -> chrono::Duration {
        let minutes = self.access_token_ttl_minutes.min(MAX_ACCESS_TOKEN_TTL_MINUTES);
        chrono::Duration::minutes(minutes as i64)
    }

    pub fn cache_sweep_interval(&self) -> Option<Duration> {
        (self.cache_sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.cache_sweep_interval_secs))
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
