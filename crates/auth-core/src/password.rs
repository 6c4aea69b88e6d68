//! Password digests
//!
//! A digest is PBKDF2-HMAC-SHA512 over the password, salted with the
//! per-user salt followed by the process-wide pepper. The 64-byte output is
//! stored base64 encoded.

use std::num::NonZeroU32;

use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;
use rand::rngs::OsRng;
use ring::pbkdf2;

use crate::{AuthError, Principal, Result, SecurityConfig};

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA512;

/// Length of a raw digest in bytes
pub const DIGEST_LEN: usize = 64;

const SALT_LEN: usize = 16;

/// Hashes and verifies passwords with a fixed pepper and iteration count.
#[derive(Clone)]
pub struct PasswordHasher {
    iterations: NonZeroU32,
    pepper: String,
}

impl PasswordHasher {
    pub fn new(iterations: u32, pepper: impl Into<String>) -> Result<Self> {
        let iterations = NonZeroU32::new(iterations).ok_or_else(|| {
            AuthError::ConfigError("password_iterations must be non-zero".to_string())
        })?;
        Ok(Self {
            iterations,
            pepper: pepper.into(),
        })
    }

    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        Self::new(config.password_iterations, config.password_pepper.clone())
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }

    /// Base64 digest of `password` under `salt`
    pub fn hash(&self, password: &str, salt: &str) -> String {
        let mut digest = [0u8; DIGEST_LEN];
        pbkdf2::derive(
            ALGORITHM,
            self.iterations,
            &self.salt_material(salt),
            password.as_bytes(),
            &mut digest,
        );
        STANDARD.encode(digest)
    }

    /// Check `password` against the principal's stored digest and salt.
    pub fn verify(&self, principal: &Principal, password: &str) -> bool {
        self.verify_digest(password, &principal.password_salt, &principal.password_hash)
    }

    /// Constant-time comparison against a stored base64 digest.
    ///
    /// A digest that is not valid base64 simply fails verification.
    pub fn verify_digest(&self, password: &str, salt: &str, digest: &str) -> bool {
        let Ok(expected) = STANDARD.decode(digest) else {
            return false;
        };
        pbkdf2::verify(
            ALGORITHM,
            self.iterations,
            &self.salt_material(salt),
            password.as_bytes(),
            &expected,
        )
        .is_ok()
    }

    fn salt_material(&self, salt: &str) -> Vec<u8> {
        let mut material = Vec::with_capacity(salt.len() + self.pepper.len());
        material.extend_from_slice(salt.as_bytes());
        material.extend_from_slice(self.pepper.as_bytes());
        material
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

/// One-shot digest without building a [`PasswordHasher`].
pub fn hash_password(password: &str, salt: &str, pepper: &str, iterations: u32) -> Result<String> {
    Ok(PasswordHasher::new(iterations, pepper)?.hash(password, salt))
}

/// Fresh random per-user salt (32 hex characters)
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
