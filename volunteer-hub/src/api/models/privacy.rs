//! API models for data export and account deletion requests.

use super::pagination::Pagination;
use crate::db::models::privacy_requests::PrivacyRequestDBResponse;
use crate::types::{PrivacyRequestId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "privacy_request_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PrivacyRequestKind {
    Export,
    Deletion,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "privacy_request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PrivacyRequestStatus {
    Pending,
    Completed,
    Rejected,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PrivacyRequestCreate {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrivacyRequestResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PrivacyRequestId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub kind: PrivacyRequestKind,
    pub status: PrivacyRequestStatus,
    pub reason: Option<String>,
    /// True once an export has been compiled and can be downloaded
    pub export_ready: bool,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<PrivacyRequestDBResponse> for PrivacyRequestResponse {
    fn from(db: PrivacyRequestDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            kind: db.kind,
            status: db.status,
            reason: db.reason,
            export_ready: db.export_data.is_some(),
            processed_by: db.processed_by,
            processed_at: db.processed_at,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PrivacyRejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListPrivacyRequestsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    pub status: Option<PrivacyRequestStatus>,
    pub kind: Option<PrivacyRequestKind>,
}
