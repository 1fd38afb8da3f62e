//! Notification fan-out and the email outbox worker.
//!
//! Handlers call [`notify`] after their business transaction commits. It writes an in-app
//! `notifications` row and a `notification_outbox` row in one small transaction. Failures are
//! logged and swallowed: a lost notification never fails the request that caused it.
//!
//! [`run_outbox_worker`] drains the outbox. A claim leases rows for `claim_lease`, taking them
//! with `FOR UPDATE SKIP LOCKED`, so several replicas can run the worker at once and no lock is
//! held while mail is sent. A failed delivery is rescheduled with exponential backoff and moved
//! to `dead` after `max_attempts`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, NotificationsConfig},
    db::{
        errors::DbError,
        handlers::{Notifications, Outbox},
        models::notifications::{OutboxCreateDBRequest, OutboxDBResponse},
    },
    email::EmailService,
    errors::Error,
    types::{OutboxId, UserId},
};

/// What happened. Stored as text on both the in-app row and the outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ApplicationReceived,
    ApplicationApproved,
    ApplicationRejected,
    ShiftBooked,
    AssignmentCancelled,
    AssignmentCompleted,
    HelpRequestReceived,
    TicketReceived,
    TicketUpdated,
    MessageReceived,
    PrivacyRequestCompleted,
    PasswordChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ApplicationReceived => "application_received",
            NotificationKind::ApplicationApproved => "application_approved",
            NotificationKind::ApplicationRejected => "application_rejected",
            NotificationKind::ShiftBooked => "shift_booked",
            NotificationKind::AssignmentCancelled => "assignment_cancelled",
            NotificationKind::AssignmentCompleted => "assignment_completed",
            NotificationKind::HelpRequestReceived => "help_request_received",
            NotificationKind::TicketReceived => "ticket_received",
            NotificationKind::TicketUpdated => "ticket_updated",
            NotificationKind::MessageReceived => "message_received",
            NotificationKind::PrivacyRequestCompleted => "privacy_request_completed",
            NotificationKind::PasswordChanged => "password_changed",
        }
    }
}

/// Who receives a notification. Anonymous recipients (public forms) get email only.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub user_id: Option<UserId>,
    pub email: String,
    pub name: Option<String>,
}

impl Recipient {
    pub fn user(user_id: UserId, email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            user_id: Some(user_id),
            email: email.into(),
            name,
        }
    }

    pub fn anonymous(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            user_id: None,
            email: email.into(),
            name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Dashboard path the email links to
    pub link: Option<String>,
}

impl Notice {
    pub fn new(kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Outbox payload, read back by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OutboxPayload {
    body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link: Option<String>,
}

async fn enqueue(pool: &PgPool, recipient: &Recipient, notice: &Notice) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    if let Some(user_id) = recipient.user_id {
        Notifications::new(&mut tx)
            .create(user_id, notice.kind.as_str(), &notice.title, &notice.body)
            .await?;
    }

    let payload = serde_json::to_value(OutboxPayload {
        body: notice.body.clone(),
        link: notice.link.clone(),
    })
    .map_err(|e| DbError::Other(e.into()))?;

    Outbox::new(&mut tx)
        .enqueue(&OutboxCreateDBRequest {
            user_id: recipient.user_id,
            recipient_email: recipient.email.clone(),
            recipient_name: recipient.name.clone(),
            kind: notice.kind.as_str().to_string(),
            subject: notice.title.clone(),
            payload,
        })
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Queue a notification. Best-effort: errors are logged, never returned.
pub async fn notify(pool: &PgPool, recipient: Recipient, notice: Notice) {
    if let Err(e) = enqueue(pool, &recipient, &notice).await {
        tracing::warn!(
            error = %e,
            kind = notice.kind.as_str(),
            user_id = ?recipient.user_id,
            "Failed to enqueue notification"
        );
    }
}

/// Delay before the next attempt, or `None` once the attempt budget is spent.
/// `attempts` counts attempts made so far, including the one that just failed.
pub fn retry_delay(attempts: i32, config: &NotificationsConfig) -> Option<Duration> {
    if attempts >= config.max_attempts {
        return None;
    }
    let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
    Some(config.retry_base_delay.saturating_mul(1 << exponent))
}

async fn deliver(email_service: &EmailService, entry: &OutboxDBResponse, payload: &OutboxPayload) -> Result<(), Error> {
    email_service
        .send_notification_email(
            &entry.recipient_email,
            entry.recipient_name.as_deref(),
            &entry.subject,
            &payload.body,
            payload.link.as_deref(),
        )
        .await
}

async fn record_sent(pool: &PgPool, id: OutboxId) -> Result<(), DbError> {
    let mut conn = pool.acquire().await?;
    Outbox::new(&mut conn).mark_sent(id).await
}

async fn record_failed(pool: &PgPool, id: OutboxId, error: &str, retry_at: Option<DateTime<Utc>>) -> Result<(), DbError> {
    let mut conn = pool.acquire().await?;
    Outbox::new(&mut conn).mark_failed(id, error, retry_at).await
}

/// Claim and deliver one batch of due entries. Returns how many were claimed.
///
/// Each outcome is written on its own. If recording one fails, the entry keeps its lease and
/// comes due again afterwards; the rest of the batch is unaffected.
pub async fn process_due(
    pool: &PgPool,
    email_service: &EmailService,
    config: &NotificationsConfig,
    now: DateTime<Utc>,
) -> Result<usize, DbError> {
    let lease = chrono::Duration::from_std(config.claim_lease).map_err(|e| DbError::Other(e.into()))?;
    let entries = {
        let mut conn = pool.acquire().await?;
        Outbox::new(&mut conn).claim_due(now, config.batch_size, now + lease).await?
    };

    for entry in &entries {
        let payload: OutboxPayload = match serde_json::from_value(entry.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                // Retrying can't repair the stored body
                tracing::error!(outbox_id = %entry.id, kind = %entry.kind, error = %e, "Unreadable outbox payload");
                if let Err(e) = record_failed(pool, entry.id, &format!("invalid payload: {e}"), None).await {
                    tracing::error!(outbox_id = %entry.id, error = %e, "Failed to record outbox failure");
                }
                continue;
            }
        };

        match deliver(email_service, entry, &payload).await {
            Ok(()) => {
                tracing::debug!(outbox_id = %entry.id, kind = %entry.kind, "Delivered notification");
                if let Err(e) = record_sent(pool, entry.id).await {
                    tracing::error!(outbox_id = %entry.id, error = %e, "Failed to record delivered notification");
                }
            }
            Err(e) => {
                let attempts = entry.attempts + 1;
                let retry_at = retry_delay(attempts, config)
                    .and_then(|delay| chrono::Duration::from_std(delay).ok())
                    .map(|delay| now + delay);
                if retry_at.is_none() {
                    tracing::error!(outbox_id = %entry.id, attempts, error = %e, "Notification delivery gave up");
                } else {
                    tracing::warn!(outbox_id = %entry.id, attempts, error = %e, "Notification delivery failed, will retry");
                }
                if let Err(e) = record_failed(pool, entry.id, &e.to_string(), retry_at).await {
                    tracing::error!(outbox_id = %entry.id, error = %e, "Failed to record outbox failure");
                }
            }
        }
    }

    Ok(entries.len())
}

pub async fn run_outbox_worker(config: NotificationsConfig, app_config: Config, pool: PgPool, shutdown: CancellationToken) {
    let email_service = match EmailService::new(&app_config) {
        Ok(svc) => svc,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create email service for notifications, disabling");
            return;
        }
    };

    tracing::info!(poll_interval = ?config.poll_interval, "Starting notification outbox worker");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            _ = shutdown.cancelled() => {
                tracing::info!("Notification outbox worker shutting down");
                return;
            }
        }

        match process_due(&pool, &email_service, &config, Utc::now()).await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "Processed notification outbox batch"),
            Err(e) => tracing::warn!(error = %e, "Failed to process notification outbox"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{notifications::OutboxStatus, users::Role};
    use crate::config::EmailTransportConfig;
    use crate::test_utils::{create_test_config, create_test_user};

    fn worker_config() -> NotificationsConfig {
        NotificationsConfig {
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(30),
            ..Default::default()
        }
    }

    #[test]
    fn test_retry_delay_doubles_until_budget_is_spent() {
        let config = worker_config();
        assert_eq!(retry_delay(1, &config), Some(Duration::from_secs(30)));
        assert_eq!(retry_delay(2, &config), Some(Duration::from_secs(60)));
        assert_eq!(retry_delay(3, &config), None);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_notify_writes_feed_and_outbox(pool: PgPool) {
        let user = create_test_user(&pool, Role::Volunteer).await;

        notify(
            &pool,
            Recipient::user(user.id, user.email.clone(), user.display_name.clone()),
            Notice::new(NotificationKind::ShiftBooked, "Shift booked", "See you Saturday.").with_link("/volunteer/assignments"),
        )
        .await;
        notify(
            &pool,
            Recipient::anonymous("walk-in@example.org", None),
            Notice::new(NotificationKind::HelpRequestReceived, "We got your request", "Someone will be in touch."),
        )
        .await;

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Notifications::new(&mut conn).count(user.id, true).await.unwrap(), 1);
        let stats = Outbox::new(&mut conn).stats().await.unwrap();
        assert_eq!(stats.pending, 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_process_due_delivers_to_file_transport(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let mut app_config = create_test_config();
        app_config.email.transport = EmailTransportConfig::File {
            path: dir.path().to_string_lossy().to_string(),
        };
        let email_service = EmailService::new(&app_config).unwrap();

        notify(
            &pool,
            Recipient::anonymous("donor@example.org", Some("Dana".to_string())),
            Notice::new(NotificationKind::TicketReceived, "Ticket received", "Thanks for reaching out."),
        )
        .await;

        let handled = process_due(&pool, &email_service, &worker_config(), Utc::now()).await.unwrap();
        assert_eq!(handled, 1);

        let mut conn = pool.acquire().await.unwrap();
        let stats = Outbox::new(&mut conn).stats().await.unwrap();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_undeliverable_entry_backs_off_then_dies(pool: PgPool) {
        let email_service = EmailService::new(&create_test_config()).unwrap();
        let config = worker_config();

        // Not a valid mailbox, so every attempt fails
        notify(
            &pool,
            Recipient::anonymous("not an address", None),
            Notice::new(NotificationKind::TicketReceived, "Ticket received", "Thanks."),
        )
        .await;

        let mut now = Utc::now();
        process_due(&pool, &email_service, &config, now).await.unwrap();

        // Not due again until the backoff has passed
        assert_eq!(process_due(&pool, &email_service, &config, now).await.unwrap(), 0);

        for _ in 0..2 {
            now += chrono::Duration::hours(1);
            assert_eq!(process_due(&pool, &email_service, &config, now).await.unwrap(), 1);
        }

        let mut conn = pool.acquire().await.unwrap();
        let entries = Outbox::new(&mut conn).list(Some(OutboxStatus::Dead), 0, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 3);
        assert!(entries[0].last_error.is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unreadable_payload_is_marked_dead_without_sending(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let mut app_config = create_test_config();
        app_config.email.transport = EmailTransportConfig::File {
            path: dir.path().to_string_lossy().to_string(),
        };
        let email_service = EmailService::new(&app_config).unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let broken = Outbox::new(&mut conn)
            .enqueue(&OutboxCreateDBRequest {
                user_id: None,
                recipient_email: "donor@example.org".to_string(),
                recipient_name: None,
                kind: "ticket_received".to_string(),
                subject: "Ticket received".to_string(),
                payload: serde_json::json!({ "unexpected": true }),
            })
            .await
            .unwrap();
        notify(
            &pool,
            Recipient::anonymous("walk-in@example.org", None),
            Notice::new(NotificationKind::HelpRequestReceived, "We got your request", "Someone will be in touch."),
        )
        .await;

        let handled = process_due(&pool, &email_service, &worker_config(), Utc::now()).await.unwrap();
        assert_eq!(handled, 2);

        // Only the readable entry produced a mail
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let broken = Outbox::new(&mut conn).get_by_id(broken.id).await.unwrap().unwrap();
        assert_eq!(broken.status, OutboxStatus::Dead);
        assert_eq!(broken.attempts, 1);
        assert!(broken.last_error.unwrap().starts_with("invalid payload"));
        assert_eq!(Outbox::new(&mut conn).stats().await.unwrap().sent, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unrecorded_claim_comes_due_after_lease(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let mut app_config = create_test_config();
        app_config.email.transport = EmailTransportConfig::File {
            path: dir.path().to_string_lossy().to_string(),
        };
        let email_service = EmailService::new(&app_config).unwrap();
        let config = worker_config();

        notify(
            &pool,
            Recipient::anonymous("donor@example.org", None),
            Notice::new(NotificationKind::TicketReceived, "Ticket received", "Thanks."),
        )
        .await;

        // A worker that claimed the entry and never recorded an outcome
        let now = Utc::now();
        let lease_until = now + chrono::Duration::from_std(config.claim_lease).unwrap();
        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Outbox::new(&mut conn).claim_due(now, 10, lease_until).await.unwrap().len(), 1);

        assert_eq!(process_due(&pool, &email_service, &config, now).await.unwrap(), 0);

        let later = lease_until + chrono::Duration::seconds(1);
        assert_eq!(process_due(&pool, &email_service, &config, later).await.unwrap(), 1);
        assert_eq!(Outbox::new(&mut conn).stats().await.unwrap().sent, 1);
    }
}
