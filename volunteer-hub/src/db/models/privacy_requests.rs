use crate::api::models::privacy::{PrivacyRequestKind, PrivacyRequestStatus};
use crate::types::{PrivacyRequestId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct PrivacyRequestDBResponse {
    pub id: PrivacyRequestId,
    pub user_id: UserId,
    pub kind: PrivacyRequestKind,
    pub status: PrivacyRequestStatus,
    pub reason: Option<String>,
    pub export_data: Option<serde_json::Value>,
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
