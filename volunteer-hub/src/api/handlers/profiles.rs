use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::profiles::{ProfileResponse, ProfileUpdate},
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Profiles, Repository},
        models::profiles::{ProfileCreateDBRequest, ProfileUpdateDBRequest},
    },
    errors::{Error, Result},
};

fn empty_profile(user_id: crate::types::UserId) -> ProfileCreateDBRequest {
    ProfileCreateDBRequest {
        user_id,
        skills: vec![],
        roles: vec![],
        preferred_time_of_day: None,
        bio: None,
    }
}

/// Get the caller's volunteer profile, creating an empty one on first access
#[utoipa::path(
    get,
    path = "/volunteer/profile",
    tag = "profiles",
    responses(
        (status = 200, description = "Volunteer profile", body = ProfileResponse),
        (status = 403, description = "Caller is not a volunteer"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_profile(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Profiles, operation::ReadOwn>,
) -> Result<Json<ProfileResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = Profiles::new(&mut conn).get_or_create(&empty_profile(current_user.id)).await?;
    Ok(Json(ProfileResponse::from(profile)))
}

/// Update the caller's volunteer profile
#[utoipa::path(
    patch,
    path = "/volunteer/profile",
    tag = "profiles",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 403, description = "Caller is not a volunteer"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Profiles, operation::UpdateOwn>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<ProfileResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut tx);
    repo.get_or_create(&empty_profile(current_user.id)).await?;
    let profile = repo.update(current_user.id, &ProfileUpdateDBRequest::from(update)).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(ProfileResponse::from(profile)))
}
