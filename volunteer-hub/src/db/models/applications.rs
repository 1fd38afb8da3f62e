//! Database models for volunteer applications.

use crate::api::models::applications::{ApplicationCreate, ApplicationStatus};
use crate::types::{ApplicationId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct ApplicationCreateDBRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub skills: Vec<String>,
    pub interests: Vec<String>,
    pub availability: Option<String>,
    pub motivation: Option<String>,
}

impl From<ApplicationCreate> for ApplicationCreateDBRequest {
    fn from(api: ApplicationCreate) -> Self {
        Self {
            first_name: api.first_name.trim().to_string(),
            last_name: api.last_name.trim().to_string(),
            email: api.email.trim().to_lowercase(),
            phone: api.phone,
            skills: normalize_tags(api.skills),
            interests: normalize_tags(api.interests),
            availability: api.availability,
            motivation: api.motivation,
        }
    }
}

/// Lowercase, trim and drop empty tags so skill matching is case-insensitive.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Status transition recorded by a reviewer.
#[derive(Debug, Clone)]
pub struct ApplicationReviewDBRequest {
    pub status: ApplicationStatus,
    pub reviewed_by: UserId,
    pub review_notes: Option<String>,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ApplicationDBResponse {
    pub id: ApplicationId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub skills: Vec<String>,
    pub interests: Vec<String>,
    pub availability: Option<String>,
    pub motivation: Option<String>,
    pub status: ApplicationStatus,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
