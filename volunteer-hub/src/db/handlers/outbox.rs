//! Email outbox. Rows are written after the business transaction commits and drained by the
//! worker in [`crate::notifications`].

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::models::notifications::{OutboxStats, OutboxStatus},
    db::{
        errors::Result,
        models::notifications::{OutboxCreateDBRequest, OutboxDBResponse},
    },
    types::{OutboxId, abbrev_uuid},
};

pub struct Outbox<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Outbox<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(kind = %request.kind), err)]
    pub async fn enqueue(&mut self, request: &OutboxCreateDBRequest) -> Result<OutboxDBResponse> {
        let entry = sqlx::query_as::<_, OutboxDBResponse>(
            r#"
            INSERT INTO notification_outbox (id, user_id, recipient_email, recipient_name, kind, subject, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.recipient_email)
        .bind(&request.recipient_name)
        .bind(&request.kind)
        .bind(&request.subject)
        .bind(&request.payload)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(entry)
    }

    /// Claim up to `limit` due pending rows by pushing their next attempt out to `lease_until`.
    /// Concurrent claims skip rows another worker is claiming. The row stays pending, so if the
    /// outcome is never recorded it comes due again once the lease runs out.
    #[instrument(skip(self), err)]
    pub async fn claim_due(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<OutboxDBResponse>> {
        let entries = sqlx::query_as::<_, OutboxDBResponse>(
            r#"
            UPDATE notification_outbox SET next_attempt_at = $3
            WHERE id IN (
                SELECT id FROM notification_outbox
                WHERE status = 'pending' AND next_attempt_at <= $1
                ORDER BY next_attempt_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(limit)
        .bind(lease_until)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(entries)
    }

    #[instrument(skip(self), fields(outbox_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_sent(&mut self, id: OutboxId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'sent', attempts = attempts + 1, sent_at = NOW(), last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *self.db)
        .await?;
        Ok(())
    }

    /// Record a failed attempt. `retry_at = None` gives up and marks the entry dead.
    #[instrument(skip(self, error), fields(outbox_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_failed(&mut self, id: OutboxId, error: &str, retry_at: Option<DateTime<Utc>>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox SET
                attempts = attempts + 1,
                last_error = $2,
                status = CASE WHEN $3::timestamptz IS NULL THEN 'dead'::outbox_status ELSE status END,
                next_attempt_at = COALESCE($3, next_attempt_at)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(retry_at)
        .execute(&mut *self.db)
        .await?;
        Ok(())
    }

    /// Put a dead entry back in the queue with a fresh attempt budget.
    #[instrument(skip(self), fields(outbox_id = %abbrev_uuid(&id)), err)]
    pub async fn retry(&mut self, id: OutboxId) -> Result<Option<OutboxDBResponse>> {
        let entry = sqlx::query_as::<_, OutboxDBResponse>(
            r#"
            UPDATE notification_outbox
            SET status = 'pending', attempts = 0, next_attempt_at = NOW()
            WHERE id = $1 AND status = 'dead'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(entry)
    }

    #[instrument(skip(self), fields(outbox_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: OutboxId) -> Result<Option<OutboxDBResponse>> {
        let entry = sqlx::query_as::<_, OutboxDBResponse>("SELECT * FROM notification_outbox WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(entry)
    }

    #[instrument(skip(self), err)]
    pub async fn list(&mut self, status: Option<OutboxStatus>, skip: i64, limit: i64) -> Result<Vec<OutboxDBResponse>> {
        let entries = sqlx::query_as::<_, OutboxDBResponse>(
            r#"
            SELECT * FROM notification_outbox
            WHERE ($1::outbox_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(entries)
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self, status: Option<OutboxStatus>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notification_outbox WHERE ($1::outbox_status IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    #[instrument(skip(self), err)]
    pub async fn stats(&mut self) -> Result<OutboxStats> {
        let rows: Vec<(OutboxStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM notification_outbox GROUP BY status")
                .fetch_all(&mut *self.db)
                .await?;

        let mut stats = OutboxStats::default();
        for (status, count) in rows {
            match status {
                OutboxStatus::Pending => stats.pending = count,
                OutboxStatus::Sent => stats.sent = count,
                OutboxStatus::Dead => stats.dead = count,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::PgPool;

    fn entry(email: &str) -> OutboxCreateDBRequest {
        OutboxCreateDBRequest {
            user_id: None,
            recipient_email: email.to_string(),
            recipient_name: None,
            kind: "shift_booked".to_string(),
            subject: "Shift confirmed".to_string(),
            payload: serde_json::json!({ "shift_title": "Food bank" }),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_claim_fail_and_retry(pool: PgPool) {
        let mut tx = pool.begin().await.unwrap();
        let mut outbox = Outbox::new(&mut tx);

        let sent = outbox.enqueue(&entry("a@example.org")).await.unwrap();
        let failing = outbox.enqueue(&entry("b@example.org")).await.unwrap();

        let lease_until = Utc::now() + Duration::minutes(5);
        let due = outbox.claim_due(Utc::now(), 10, lease_until).await.unwrap();
        assert_eq!(due.len(), 2);
        // leased, so a second claim finds nothing until the lease expires
        assert!(outbox.claim_due(Utc::now(), 10, lease_until).await.unwrap().is_empty());
        assert_eq!(
            outbox
                .claim_due(lease_until + Duration::seconds(1), 10, lease_until + Duration::minutes(5))
                .await
                .unwrap()
                .len(),
            2
        );

        outbox.mark_sent(sent.id).await.unwrap();
        outbox
            .mark_failed(failing.id, "connection refused", Some(Utc::now() + Duration::minutes(5)))
            .await
            .unwrap();

        // rescheduled into the future, so nothing is due now
        assert!(outbox.claim_due(Utc::now(), 10, lease_until).await.unwrap().is_empty());
        assert_eq!(
            outbox.stats().await.unwrap(),
            OutboxStats {
                pending: 1,
                sent: 1,
                dead: 0
            }
        );

        outbox.mark_failed(failing.id, "connection refused", None).await.unwrap();
        let dead = outbox.get_by_id(failing.id).await.unwrap().unwrap();
        assert_eq!(dead.status, OutboxStatus::Dead);
        assert_eq!(dead.attempts, 2);

        assert!(outbox.retry(sent.id).await.unwrap().is_none());
        let requeued = outbox.retry(failing.id).await.unwrap().unwrap();
        assert_eq!(requeued.status, OutboxStatus::Pending);
        assert_eq!(requeued.attempts, 0);
        assert_eq!(outbox.count(Some(OutboxStatus::Pending)).await.unwrap(), 1);
    }
}
