//! Access token minting and bearer token sealing
//!
//! A bearer token is `base64url(nonce || AES-256-GCM(header || access_token))`.
//! The AES key is the SHA-256 digest of the configured bearer token key.
//! Decoding answers `None` for anything that does not open under that key or
//! does not start with the configured header; forged tokens are ordinary
//! traffic, not errors.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::digest::{SHA256, digest};

use crate::{AuthError, Result, SecurityConfig};

const ACCESS_TOKEN_BYTES: usize = 16;

/// Seals access tokens into bearer tokens and opens them again.
pub struct TokenCodec {
    key: LessSafeKey,
    header: String,
}

impl TokenCodec {
    pub fn new(bearer_token_key: &str, access_token_header: impl Into<String>) -> Result<Self> {
        let key_bytes = digest(&SHA256, bearer_token_key.as_bytes());
        let unbound = UnboundKey::new(&AES_256_GCM, key_bytes.as_ref())
            .map_err(|_| AuthError::CryptoError("failed to build bearer token key".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            header: access_token_header.into(),
        })
    }

    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        Self::new(&config.bearer_token_key, config.access_token_header.clone())
    }

    /// Seal `access_token` into an opaque bearer token.
    pub fn encode(&self, access_token: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out =
            Vec::with_capacity(self.header.len() + access_token.len() + AES_256_GCM.tag_len());
        in_out.extend_from_slice(self.header.as_bytes());
        in_out.extend_from_slice(access_token.as_bytes());

        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| AuthError::CryptoError("failed to seal bearer token".to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + in_out.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&in_out);

        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Recover the access token sealed in `bearer_token`.
    pub fn decode(&self, bearer_token: &str) -> Option<String> {
        let payload = URL_SAFE_NO_PAD.decode(bearer_token.trim()).ok()?;
        if payload.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return None;
        }

        let (nonce_bytes, sealed) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).ok()?;
        let mut sealed = sealed.to_vec();
        let plaintext = self.key.open_in_place(nonce, Aad::empty(), &mut sealed).ok()?;

        let plaintext = std::str::from_utf8(plaintext).ok()?;
        plaintext.strip_prefix(self.header.as_str()).map(str::to_owned)
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

/// A new 128-bit access token as 32 lowercase hex characters.
///
/// Collisions are not checked for.
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; ACCESS_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
