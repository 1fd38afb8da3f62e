use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::json;

use crate::{
    AppState,
    api::models::{
        pagination::PaginatedResponse,
        support_tickets::{ListTicketsQuery, TicketCreate, TicketResponse, TicketUpdate},
        users::CurrentUser,
    },
    audit::{self, AuditEntry},
    auth::permissions::{self, RequiresPermission, operation, resource},
    db::{
        errors::DbError,
        handlers::{Repository, SupportTickets, support_tickets::TicketFilter},
        models::support_tickets::{TicketCreateDBRequest, TicketUpdateDBRequest},
    },
    errors::{Error, Result},
    notifications::{self, Notice, NotificationKind, Recipient},
    types::{Resource, TicketId},
};

fn ticket_not_found(id: TicketId) -> Error {
    Error::NotFound {
        resource: "Support ticket".to_string(),
        id: id.to_string(),
    }
}

/// Open a support ticket
///
/// Anonymous callers must give an email address. Signed-in callers default to their account
/// email.
#[utoipa::path(
    post,
    path = "/support-tickets",
    tag = "support_tickets",
    request_body = TicketCreate,
    responses(
        (status = 201, description = "Ticket created", body = TicketResponse),
        (status = 400, description = "Invalid ticket"),
        (status = 429, description = "Too many requests"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_ticket(
    State(state): State<AppState>,
    current_user: Option<CurrentUser>,
    Json(body): Json<TicketCreate>,
) -> Result<(StatusCode, Json<TicketResponse>)> {
    let email = body
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .or_else(|| current_user.as_ref().map(|u| u.email.clone()))
        .ok_or_else(|| Error::BadRequest {
            message: "An email address is required".to_string(),
        })?;
    if !email.contains('@') {
        return Err(Error::BadRequest {
            message: "A valid email address is required".to_string(),
        });
    }
    if body.subject.trim().is_empty() || body.message.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Subject and message are required".to_string(),
        });
    }

    let user_id = current_user.as_ref().map(|u| u.id);
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let ticket = SupportTickets::new(&mut conn)
        .create(&TicketCreateDBRequest {
            user_id,
            email,
            subject: body.subject.trim().to_string(),
            message: body.message,
            category: body.category,
            priority: body.priority,
        })
        .await?;
    drop(conn);

    let name = current_user.and_then(|u| u.display_name);
    let recipient = match user_id {
        Some(id) => Recipient::user(id, ticket.email.clone(), name),
        None => Recipient::anonymous(ticket.email.clone(), None),
    };
    notifications::notify(
        &state.db,
        recipient,
        Notice::new(
            NotificationKind::TicketReceived,
            format!("Ticket received: {}", ticket.subject),
            "Thanks for contacting support. We'll get back to you as soon as we can.",
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(TicketResponse::from(ticket))))
}

/// List support tickets
///
/// Staff see every ticket; everyone else sees their own.
#[utoipa::path(
    get,
    path = "/support-tickets",
    tag = "support_tickets",
    params(ListTicketsQuery),
    responses(
        (status = 200, description = "Page of tickets", body = PaginatedResponse<TicketResponse>),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<ListTicketsQuery>,
    current_user: RequiresPermission<resource::SupportTickets, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<TicketResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = TicketFilter {
        skip,
        limit,
        status: query.status,
        user_id: (!permissions::can_read_all_resources(&current_user, Resource::SupportTickets)).then_some(current_user.id),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = SupportTickets::new(&mut conn);
    let tickets = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        tickets.into_iter().map(TicketResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get a support ticket
#[utoipa::path(
    get,
    path = "/support-tickets/{id}",
    tag = "support_tickets",
    params(("id" = uuid::Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket", body = TicketResponse),
        (status = 404, description = "Ticket not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<TicketId>,
    current_user: RequiresPermission<resource::SupportTickets, operation::ReadOwn>,
) -> Result<Json<TicketResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let ticket = SupportTickets::new(&mut conn)
        .get_by_id(id)
        .await?
        .filter(|t| t.user_id == Some(current_user.id) || permissions::can_read_all_resources(&current_user, Resource::SupportTickets))
        .ok_or_else(|| ticket_not_found(id))?;
    Ok(Json(TicketResponse::from(ticket)))
}

/// Update a support ticket
#[utoipa::path(
    patch,
    path = "/admin/support-tickets/{id}",
    tag = "support_tickets",
    request_body = TicketUpdate,
    params(("id" = uuid::Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket updated", body = TicketResponse),
        (status = 404, description = "Ticket not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_ticket(
    State(state): State<AppState>,
    Path(id): Path<TicketId>,
    current_user: RequiresPermission<resource::SupportTickets, operation::UpdateAll>,
    Json(body): Json<TicketUpdate>,
) -> Result<Json<TicketResponse>> {
    let status_changed = body.status.is_some() || body.resolution.is_some();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let ticket = SupportTickets::new(&mut conn)
        .update(id, &TicketUpdateDBRequest::from(body))
        .await
        .map_err(|e| match e {
            DbError::NotFound => ticket_not_found(id),
            other => Error::Database(other),
        })?;
    drop(conn);

    audit::record(
        &state.db,
        &current_user,
        AuditEntry::new("support_ticket.update", "support_ticket", id).with_details(json!({ "status": ticket.status })),
    )
    .await;

    if status_changed {
        let recipient = match ticket.user_id {
            Some(user_id) => Recipient::user(user_id, ticket.email.clone(), None),
            None => Recipient::anonymous(ticket.email.clone(), None),
        };
        let status = format!("{:?}", ticket.status).to_lowercase();
        let body = match &ticket.resolution {
            Some(resolution) => format!("Your ticket is now {status}. {resolution}"),
            None => format!("Your ticket is now {status}."),
        };
        notifications::notify(
            &state.db,
            recipient,
            Notice::new(NotificationKind::TicketUpdated, format!("Update on: {}", ticket.subject), body)
                .with_link(format!("/support-tickets/{}", ticket.id)),
        )
        .await;
    }

    Ok(Json(TicketResponse::from(ticket)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::support_tickets::TicketStatus;
    use crate::api::models::users::Role;
    use crate::test_utils::{add_auth_headers, create_test_app, create_test_user};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_anonymous_ticket_requires_email(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;

        server
            .post("/api/v1/support-tickets")
            .json(&json!({ "subject": "Login help", "message": "I can't sign in" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let response = server
            .post("/api/v1/support-tickets")
            .json(&json!({ "email": "someone@example.org", "subject": "Login help", "message": "I can't sign in" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let ticket: TicketResponse = response.json();
        assert!(ticket.user_id.is_none());
        assert_eq!(ticket.status, TicketStatus::Open);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_ticket_visibility(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let owner = create_test_user(&pool, Role::Volunteer).await;
        let other = create_test_user(&pool, Role::Volunteer).await;
        let staff = create_test_user(&pool, Role::Staff).await;
        let owner_auth = add_auth_headers(&owner);
        let other_auth = add_auth_headers(&other);
        let staff_auth = add_auth_headers(&staff);

        let ticket: TicketResponse = server
            .post("/api/v1/support-tickets")
            .add_header(&owner_auth[0].0, &owner_auth[0].1)
            .json(&json!({ "subject": "Shift question", "message": "Can I bring a friend?" }))
            .await
            .json();
        assert_eq!(ticket.user_id, Some(owner.id));
        assert_eq!(ticket.email, owner.email);

        server
            .get(&format!("/api/v1/support-tickets/{}", ticket.id))
            .add_header(&other_auth[0].0, &other_auth[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .get(&format!("/api/v1/support-tickets/{}", ticket.id))
            .add_header(&owner_auth[0].0, &owner_auth[0].1)
            .await
            .assert_status_ok();

        let mine: PaginatedResponse<TicketResponse> = server
            .get("/api/v1/support-tickets")
            .add_header(&other_auth[0].0, &other_auth[0].1)
            .await
            .json();
        assert_eq!(mine.total_count, 0);

        let all: PaginatedResponse<TicketResponse> = server
            .get("/api/v1/support-tickets")
            .add_header(&staff_auth[0].0, &staff_auth[0].1)
            .await
            .json();
        assert_eq!(all.total_count, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_staff_resolves_ticket_and_notifies_owner(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let owner = create_test_user(&pool, Role::Volunteer).await;
        let staff = create_test_user(&pool, Role::Staff).await;
        let owner_auth = add_auth_headers(&owner);
        let staff_auth = add_auth_headers(&staff);

        let ticket: TicketResponse = server
            .post("/api/v1/support-tickets")
            .add_header(&owner_auth[0].0, &owner_auth[0].1)
            .json(&json!({ "subject": "Parking", "message": "Where do I park?" }))
            .await
            .json();

        server
            .patch(&format!("/api/v1/admin/support-tickets/{}", ticket.id))
            .add_header(&owner_auth[0].0, &owner_auth[0].1)
            .json(&json!({ "status": "resolved" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let resolved: TicketResponse = server
            .patch(&format!("/api/v1/admin/support-tickets/{}", ticket.id))
            .add_header(&staff_auth[0].0, &staff_auth[0].1)
            .json(&json!({ "status": "resolved", "resolution": "Use the rear car park." }))
            .await
            .json();
        assert_eq!(resolved.status, TicketStatus::Resolved);

        let updates: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND kind = 'ticket_updated'")
            .bind(owner.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(updates, 1);
    }
}
