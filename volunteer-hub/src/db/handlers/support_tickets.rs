
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::models::support_tickets::TicketStatus,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::support_tickets::{TicketCreateDBRequest, TicketDBResponse, TicketUpdateDBRequest},
    },
    types::{TicketId, UserId, abbrev_uuid},
};

#[derive(Debug, Clone)]
pub struct TicketFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<TicketStatus>,
    /// Restrict to one submitter; `None` lists every ticket
    pub user_id: Option<UserId>,
}

pub struct SupportTickets<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for SupportTickets<'c> {
    type CreateRequest = TicketCreateDBRequest;
    type UpdateRequest = TicketUpdateDBRequest;
    type Response = TicketDBResponse;
    type Id = TicketId;
    type Filter = TicketFilter;

    #[instrument(skip(self, request), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let ticket = sqlx::query_as::<_, TicketDBResponse>(
            r#"
            INSERT INTO support_tickets (id, user_id, email, subject, message, category, priority)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.email)
        .bind(&request.subject)
        .bind(&request.message)
        .bind(&request.category)
        .bind(request.priority)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(ticket)
    }

    #[instrument(skip(self), fields(ticket_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let ticket = sqlx::query_as::<_, TicketDBResponse>("SELECT * FROM support_tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(ticket)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let tickets = sqlx::query_as::<_, TicketDBResponse>(
            r#"
            SELECT * FROM support_tickets
            WHERE ($1::ticket_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR user_id = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.status)
        .bind(filter.user_id)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(tickets)
    }

    #[instrument(skip(self), fields(ticket_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM support_tickets WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(ticket_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let ticket = sqlx::query_as::<_, TicketDBResponse>(
            r#"
            UPDATE support_tickets SET
                status = COALESCE($2, status),
                priority = COALESCE($3, priority),
                assigned_to = COALESCE($4, assigned_to),
                resolution = COALESCE($5, resolution),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.status)
        .bind(request.priority)
        .bind(request.assigned_to)
        .bind(&request.resolution)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(ticket)
    }
}

impl<'c> SupportTickets<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &TicketFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM support_tickets
            WHERE ($1::ticket_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR user_id = $2)
            "#,
        )
        .bind(filter.status)
        .bind(filter.user_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{shifts::Priority, users::Role};
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_tickets_scoped_to_submitter(pool: PgPool) {
        let donor = create_test_user(&pool, Role::Donor).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = SupportTickets::new(&mut conn);

        let mine = repo
            .create(&TicketCreateDBRequest {
                user_id: Some(donor.id),
                email: donor.email.clone(),
                subject: "Receipt missing".to_string(),
                message: "I did not get a receipt".to_string(),
                category: Some("donations".to_string()),
                priority: Priority::Normal,
            })
            .await
            .unwrap();
        repo.create(&TicketCreateDBRequest {
            user_id: None,
            email: "anon@example.org".to_string(),
            subject: "Opening hours".to_string(),
            message: "When are you open?".to_string(),
            category: None,
            priority: Priority::Low,
        })
        .await
        .unwrap();

        let filter = TicketFilter {
            skip: 0,
            limit: 10,
            status: None,
            user_id: Some(donor.id),
        };
        let listed = repo.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.id);

        let resolved = repo
            .update(
                mine.id,
                &TicketUpdateDBRequest {
                    status: Some(TicketStatus::Resolved),
                    resolution: Some("Resent".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, TicketStatus::Resolved);
        assert_eq!(repo.count(&TicketFilter { user_id: None, ..filter }).await.unwrap(), 2);
    }
}
