use super::pagination::Pagination;
use crate::db::models::documents::DocumentDBResponse;
use crate::types::{DocumentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Document metadata. Content is served from `/documents/{id}/content`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: DocumentId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    /// Hex-encoded SHA-256 of the content
    pub sha256: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DocumentDBResponse> for DocumentResponse {
    fn from(db: DocumentDBResponse) -> Self {
        Self {
            id: db.id,
            owner_id: db.owner_id,
            filename: db.filename,
            content_type: db.content_type,
            size_bytes: db.size_bytes,
            sha256: db.sha256,
            category: db.category,
            created_at: db.created_at,
        }
    }
}

/// Multipart upload form, for the OpenAPI schema only.
#[derive(Debug, ToSchema)]
pub struct DocumentUpload {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListDocumentsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    pub category: Option<String>,
    /// Admins and staff may list another user's documents
    #[param(value_type = Option<String>, format = "uuid")]
    pub owner_id: Option<UserId>,
}
