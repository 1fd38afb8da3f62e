use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::models::messages::Folder,
    db::{
        errors::Result,
        models::messages::{MessageCreateDBRequest, MessageDBResponse},
    },
    types::{MessageId, UserId, abbrev_uuid},
};

pub struct Messages<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Messages<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(sender_id = %abbrev_uuid(&request.sender_id), recipient_id = %abbrev_uuid(&request.recipient_id)), err)]
    pub async fn create(&mut self, request: &MessageCreateDBRequest) -> Result<MessageDBResponse> {
        let message = sqlx::query_as::<_, MessageDBResponse>(
            r#"
            INSERT INTO messages (id, sender_id, recipient_id, subject, body)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.sender_id)
        .bind(request.recipient_id)
        .bind(&request.subject)
        .bind(&request.body)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(message)
    }

    /// A message visible to `user_id` as either sender or recipient.
    #[instrument(skip(self), fields(message_id = %abbrev_uuid(&id)), err)]
    pub async fn get_for_participant(&mut self, id: MessageId, user_id: UserId) -> Result<Option<MessageDBResponse>> {
        let message = sqlx::query_as::<_, MessageDBResponse>(
            "SELECT * FROM messages WHERE id = $1 AND (sender_id = $2 OR recipient_id = $2)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(message)
    }

    /// Mark read if `user_id` is the recipient and it is still unread. Returns the current row.
    #[instrument(skip(self), fields(message_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_read(&mut self, id: MessageId, user_id: UserId) -> Result<Option<MessageDBResponse>> {
        sqlx::query("UPDATE messages SET read_at = NOW() WHERE id = $1 AND recipient_id = $2 AND read_at IS NULL")
            .bind(id)
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;
        self.get_for_participant(id, user_id).await
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), folder = ?folder), err)]
    pub async fn list(&mut self, user_id: UserId, folder: Folder, skip: i64, limit: i64) -> Result<Vec<MessageDBResponse>> {
        let query = match folder {
            Folder::Inbox => "SELECT * FROM messages WHERE recipient_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            Folder::Sent => "SELECT * FROM messages WHERE sender_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        };
        let messages = sqlx::query_as::<_, MessageDBResponse>(query)
            .bind(user_id)
            .bind(limit)
            .bind(skip)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(messages)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn count(&mut self, user_id: UserId, folder: Folder) -> Result<i64> {
        let query = match folder {
            Folder::Inbox => "SELECT COUNT(*) FROM messages WHERE recipient_id = $1",
            Folder::Sent => "SELECT COUNT(*) FROM messages WHERE sender_id = $1",
        };
        let count = sqlx::query_scalar::<_, i64>(query).bind(user_id).fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn unread_count(&mut self, user_id: UserId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE recipient_id = $1 AND read_at IS NULL")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }

    /// Every message the user sent or received, oldest first.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn all_for_user(&mut self, user_id: UserId) -> Result<Vec<MessageDBResponse>> {
        let messages = sqlx::query_as::<_, MessageDBResponse>(
            "SELECT * FROM messages WHERE sender_id = $1 OR recipient_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(messages)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn delete_for_user(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE sender_id = $1 OR recipient_id = $1")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
