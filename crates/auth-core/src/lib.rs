//! # Auth-Core - Claim-based request authorization for ClaimGate
//!
//! This crate decides whether an inbound request is authenticated and,
//! optionally, whether the caller holds a required [`Claim`].
//!
//! It is built from four pieces:
//! - [`PasswordHasher`]: salted and peppered PBKDF2 password digests
//! - [`TokenCodec`]: seals access tokens into opaque bearer tokens and back
//! - [`CredentialCache`]: expiring in-memory store of authenticated claims
//! - [`AuthorizationEngine`]: composes the above with a [`PrincipalResolver`]
//!   to classify a request as authorized, unauthenticated or forbidden
//!
//! ```no_run
//! use claimgate_auth_core::{AuthorizationEngine, Claim, SecurityConfig};
//!
//! # async fn run(resolver: impl claimgate_auth_core::PrincipalResolver) -> claimgate_auth_core::Result<()> {
//! let engine = AuthorizationEngine::new(SecurityConfig::from_env()?)?;
//! let admin = Claim::new("role", "admin");
//! let decision = engine
//!     .is_authorized(Some("Bearer abc"), Some(&admin), &resolver)
//!     .await;
//! println!("{} {:?}", decision.status_code(), decision);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod password;
pub mod throttle;
pub mod token;
pub mod types;

pub use cache::{CredentialCache, ExpiringCache};
pub use config::SecurityConfig;
pub use engine::{Authorization, AuthorizationEngine, PrincipalResolver, bearer_credential};
pub use error::{AuthError, Result};
pub use password::{PasswordHasher, generate_salt, hash_password};
pub use throttle::mitigate_brute_force;
pub use token::{TokenCodec, generate_access_token};
pub use types::{
    AccessTokenRequest, AuthDecision, Claim, Credentials, Principal, TOKEN_TYPE_BEARER,
    TokenResponse,
};
