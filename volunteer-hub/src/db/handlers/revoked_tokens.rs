//! Blacklist of session tokens that were logged out before they expired.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::errors::Result,
    types::{UserId, abbrev_uuid},
};

pub struct RevokedTokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> RevokedTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(jti = %abbrev_uuid(&jti), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn revoke(&mut self, jti: Uuid, user_id: UserId, expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO revoked_tokens (jti, user_id, expires_at) VALUES ($1, $2, $3) ON CONFLICT (jti) DO NOTHING")
            .bind(jti)
            .bind(user_id)
            .bind(expires_at)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(jti = %abbrev_uuid(&jti)), err)]
    pub async fn is_revoked(&mut self, jti: Uuid) -> Result<bool> {
        let revoked = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE jti = $1)")
            .bind(jti)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(revoked)
    }

    /// Rows past their token's own expiry can never match a valid token again.
    #[instrument(skip(self), err)]
    pub async fn purge_expired(&mut self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < NOW()")
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_revoke_and_purge(pool: PgPool) {
        let user = create_test_user(&pool, Role::Visitor).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = RevokedTokens::new(&mut conn);

        let live = Uuid::new_v4();
        let stale = Uuid::new_v4();
        repo.revoke(live, user.id, Utc::now() + chrono::Duration::hours(1)).await.unwrap();
        repo.revoke(stale, user.id, Utc::now() - chrono::Duration::hours(1)).await.unwrap();
        // revoking twice is harmless
        repo.revoke(live, user.id, Utc::now() + chrono::Duration::hours(1)).await.unwrap();

        assert!(repo.is_revoked(live).await.unwrap());
        assert!(!repo.is_revoked(Uuid::new_v4()).await.unwrap());

        assert_eq!(repo.purge_expired().await.unwrap(), 1);
        assert!(!repo.is_revoked(stale).await.unwrap());
        assert!(repo.is_revoked(live).await.unwrap());
    }
}
