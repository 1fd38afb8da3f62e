//! Argon2id password hashing, password rules and reset tokens.
//!
//! Hashes are PHC strings, so they carry their own salt and cost parameters. Changing the
//! configured cost only affects new hashes; existing ones keep verifying.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine as _, engine::general_purpose};
use rand::prelude::RngExt;
use rand::rng;

use crate::{config::PasswordConfig, errors::Error};

/// Bytes of entropy in a password reset token.
const RESET_TOKEN_BYTES: usize = 32;

/// Argon2 cost settings.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self::from(&PasswordConfig::default())
    }
}

impl From<&PasswordConfig> for Argon2Params {
    fn from(config: &PasswordConfig) -> Self {
        Self {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
            parallelism: config.argon2_parallelism,
        }
    }
}

impl Argon2Params {
    fn hasher(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("build argon2 params: {e}"),
        })?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Check a candidate password against the configured length bounds.
pub fn validate_password(password: &str, config: &PasswordConfig) -> Result<(), Error> {
    let length = password.chars().count();
    if length < config.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters long", config.min_length),
        });
    }
    if length > config.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at most {} characters long", config.max_length),
        });
    }
    Ok(())
}

/// Hash with explicit cost settings, or the defaults when `None`.
pub fn hash_string_with_params(input: &str, params: Option<Argon2Params>) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    params
        .unwrap_or_default()
        .hasher()?
        .hash_password(input.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal {
            operation: format!("hash password: {e}"),
        })
}

pub fn hash_string(input: &str) -> Result<String, Error> {
    hash_string_with_params(input, None)
}

/// `Ok(false)` on a mismatch; `Err` only when the stored hash is malformed.
pub fn verify_string(input: &str, hash: &str) -> Result<bool, Error> {
    let parsed = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse stored hash: {e}"),
    })?;
    Ok(Argon2::default().verify_password(input.as_bytes(), &parsed).is_ok())
}

/// Hash on the blocking pool so a slow hash doesn't stall the runtime.
pub async fn hash_password_blocking(password: String, params: Argon2Params) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || hash_string_with_params(&password, Some(params)))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })?
}

pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, Error> {
    tokio::task::spawn_blocking(move || verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })?
}

/// Random URL-safe token, unpadded base64.
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rng().fill(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
