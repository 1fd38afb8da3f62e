//! JWT session token creation and verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::models::users::{CurrentUser, Role},
    config::Config,
    errors::Error,
    types::UserId,
};

/// JWT session claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,      // Subject (user ID)
    pub jti: Uuid,        // Token id, checked against revoked_tokens
    pub email: String,    // User email
    pub username: String, // Username
    pub roles: Vec<Role>, // User roles
    pub is_admin: bool,   // Admin flag
    pub exp: i64,         // Expiration time
    pub iat: i64,         // Issued at
}

impl SessionClaims {
    /// Create new session claims for a user
    pub fn new(user: &CurrentUser, config: &Config) -> Self {
        let now = Utc::now();
        let exp = now + config.auth.security.jwt_expiry;

        Self {
            sub: user.id,
            jti: Uuid::new_v4(),
            email: user.email.clone(),
            username: user.username.clone(),
            roles: user.roles.clone(),
            is_admin: user.is_admin,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

impl From<SessionClaims> for CurrentUser {
    fn from(claims: SessionClaims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            username: claims.username,
            roles: claims.roles,
            is_admin: claims.is_admin,
            display_name: None, // Not stored in JWT
            session_id: Some(claims.jti),
        }
    }
}

fn secret(config: &Config) -> Result<&[u8], Error> {
    config
        .secret_key
        .as_deref()
        .map(str::as_bytes)
        .ok_or_else(|| Error::Internal {
            operation: "JWT sessions: secret_key is required".to_string(),
        })
}

/// Create a JWT token for a user session
pub fn create_session_token(user: &CurrentUser, config: &Config) -> Result<String, Error> {
    let claims = SessionClaims::new(user, config);
    let key = EncodingKey::from_secret(secret(config)?);
    encode(&Header::default(), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Verify signature and expiry of a JWT session token and return its claims.
///
/// Revocation is not checked here, it needs the database. See
/// [`crate::auth::current_user`].
pub fn verify_session_token(token: &str, config: &Config) -> Result<SessionClaims, Error> {
    let key = DecodingKey::from_secret(secret(config)?);
    let validation = Validation::default();

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::Json(_)
        | jsonwebtoken::errors::ErrorKind::Utf8(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::Unauthenticated { message: None },

        // Anything else is a key or library problem on our side
        _ => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },
    })?;

    Ok(token_data.claims)
}
