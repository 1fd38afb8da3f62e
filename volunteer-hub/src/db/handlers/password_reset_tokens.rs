//! Database repository for password reset tokens.

use chrono::Utc;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::password::{self, Argon2Params},
    config::Config,
    db::{
        errors::{DbError, Result},
        models::password_reset_tokens::PasswordResetToken,
    },
    types::{UserId, abbrev_uuid},
};

pub struct PasswordResetTokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> PasswordResetTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Issue a token for a user. Returns the raw token (only ever sent by email) and the stored row.
    #[instrument(skip(self, config), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create_for_user(&mut self, user_id: UserId, config: &Config) -> Result<(String, PasswordResetToken)> {
        let raw_token = password::generate_reset_token();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(config.auth.native.password_reset_token_duration).unwrap_or(chrono::Duration::minutes(30));

        let params = Argon2Params::from(&config.auth.native.password);
        let token_hash = password::hash_password_blocking(raw_token.clone(), params)
            .await
            .map_err(|e| DbError::Other(anyhow::anyhow!(e)))?;

        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, token_hash, expires_at, created_at, used_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok((raw_token, token))
    }

    /// Find an unused, unexpired token by id whose hash matches the raw token.
    #[instrument(skip(self, raw_token), fields(token_id = %abbrev_uuid(&token_id)), err)]
    pub async fn find_valid_token_by_id(&mut self, token_id: Uuid, raw_token: &str) -> Result<Option<PasswordResetToken>> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT id, user_id, token_hash, expires_at, created_at, used_at FROM password_reset_tokens WHERE id = $1",
        )
        .bind(token_id)
        .fetch_optional(&mut *self.db)
        .await?;

        let Some(token) = token else {
            return Ok(None);
        };
        if !token.is_usable(Utc::now()) {
            return Ok(None);
        }

        match password::verify_password_blocking(raw_token.to_string(), token.token_hash.clone()).await {
            Ok(true) => Ok(Some(token)),
            Ok(false) => Ok(None),
            Err(e) => {
                tracing::error!("Token verification error for token {}: {:?}", token_id, e);
                Ok(None)
            }
        }
    }

    /// Invalidate every outstanding token for a user
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn invalidate_for_user(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("UPDATE password_reset_tokens SET used_at = NOW() WHERE user_id = $1 AND used_at IS NULL")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{create_test_config, create_test_user};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_token_lifecycle(pool: PgPool) {
        let user = create_test_user(&pool, Role::Volunteer).await;
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = PasswordResetTokens::new(&mut conn);

        let (raw, token) = repo.create_for_user(user.id, &config).await.unwrap();
        assert_eq!(raw.len(), 43);

        assert!(repo.find_valid_token_by_id(token.id, &raw).await.unwrap().is_some());
        assert!(repo.find_valid_token_by_id(token.id, "not-the-token").await.unwrap().is_none());

        assert_eq!(repo.invalidate_for_user(user.id).await.unwrap(), 1);
        assert!(repo.find_valid_token_by_id(token.id, &raw).await.unwrap().is_none());
    }
}
