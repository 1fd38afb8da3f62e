//! In-app notification feed.

use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{errors::Result, models::notifications::NotificationDBResponse},
    types::{NotificationId, UserId, abbrev_uuid},
};

pub struct Notifications<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Notifications<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, title, body), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create(&mut self, user_id: UserId, kind: &str, title: &str, body: &str) -> Result<NotificationDBResponse> {
        let notification = sqlx::query_as::<_, NotificationDBResponse>(
            "INSERT INTO notifications (id, user_id, kind, title, body) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(kind)
        .bind(title)
        .bind(body)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(notification)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list(&mut self, user_id: UserId, unread_only: bool, skip: i64, limit: i64) -> Result<Vec<NotificationDBResponse>> {
        let notifications = sqlx::query_as::<_, NotificationDBResponse>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR read_at IS NULL)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(notifications)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn count(&mut self, user_id: UserId, unread_only: bool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND (NOT $2 OR read_at IS NULL)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Returns false when the notification does not exist or belongs to someone else.
    #[instrument(skip(self), fields(notification_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_read(&mut self, id: NotificationId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("UPDATE notifications SET read_at = COALESCE(read_at, NOW()) WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn mark_all_read(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET read_at = NOW() WHERE user_id = $1 AND read_at IS NULL")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
