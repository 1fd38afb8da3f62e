use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        messages::{ListMessagesQuery, MessageCreate, MessageResponse, UnreadCount},
        pagination::PaginatedResponse,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Messages, Repository, Users},
        models::messages::MessageCreateDBRequest,
    },
    errors::{Error, Result},
    notifications::{self, Notice, NotificationKind, Recipient},
    types::MessageId,
};

const MAX_SUBJECT_LEN: usize = 200;

/// Send a direct message
#[utoipa::path(
    post,
    path = "/messages",
    tag = "messages",
    request_body = MessageCreate,
    responses(
        (status = 201, description = "Message sent", body = MessageResponse),
        (status = 400, description = "Empty message or unknown recipient"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn send_message(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Messages, operation::CreateOwn>,
    Json(body): Json<MessageCreate>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let subject = body.subject.trim().to_string();
    if subject.is_empty() || body.body.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Subject and body are required".to_string(),
        });
    }
    if subject.chars().count() > MAX_SUBJECT_LEN {
        return Err(Error::BadRequest {
            message: format!("Subject must be at most {MAX_SUBJECT_LEN} characters"),
        });
    }
    if body.recipient_id == current_user.id {
        return Err(Error::BadRequest {
            message: "You cannot message yourself".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let recipient = Users::new(&mut conn)
        .get_by_id(body.recipient_id)
        .await?
        .filter(|u| u.deleted_at.is_none())
        .ok_or_else(|| Error::BadRequest {
            message: "Recipient does not exist".to_string(),
        })?;

    let message = Messages::new(&mut conn)
        .create(&MessageCreateDBRequest {
            sender_id: current_user.id,
            recipient_id: recipient.id,
            subject,
            body: body.body,
        })
        .await?;
    drop(conn);

    let sender = current_user.display_name.clone().unwrap_or_else(|| current_user.username.clone());
    notifications::notify(
        &state.db,
        Recipient::user(recipient.id, recipient.email, recipient.display_name),
        Notice::new(
            NotificationKind::MessageReceived,
            format!("New message from {sender}"),
            message.subject.clone(),
        )
        .with_link(format!("/messages/{}", message.id)),
    )
    .await;

    Ok((StatusCode::CREATED, Json(MessageResponse::from(message))))
}

/// List messages in the inbox or sent folder
#[utoipa::path(
    get,
    path = "/messages",
    tag = "messages",
    params(ListMessagesQuery),
    responses(
        (status = 200, description = "Page of messages", body = PaginatedResponse<MessageResponse>),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ListMessagesQuery>,
    current_user: RequiresPermission<resource::Messages, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<MessageResponse>>> {
    let (skip, limit) = query.pagination.params();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Messages::new(&mut conn);
    let messages = repo.list(current_user.id, query.folder, skip, limit).await?;
    let total_count = repo.count(current_user.id, query.folder).await?;

    Ok(Json(PaginatedResponse::new(
        messages.into_iter().map(MessageResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Number of unread messages in the inbox
#[utoipa::path(
    get,
    path = "/messages/unread-count",
    tag = "messages",
    responses(
        (status = 200, description = "Unread count", body = UnreadCount),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn unread_count(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Messages, operation::ReadOwn>,
) -> Result<Json<UnreadCount>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let unread = Messages::new(&mut conn).unread_count(current_user.id).await?;
    Ok(Json(UnreadCount { unread }))
}

/// Read a message
///
/// Opening a message as its recipient marks it read.
#[utoipa::path(
    get,
    path = "/messages/{id}",
    tag = "messages",
    params(("id" = uuid::Uuid, Path, description = "Message ID")),
    responses(
        (status = 200, description = "Message", body = MessageResponse),
        (status = 404, description = "Message not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<MessageId>,
    current_user: RequiresPermission<resource::Messages, operation::ReadOwn>,
) -> Result<Json<MessageResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let message = Messages::new(&mut conn)
        .mark_read(id, current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Message".to_string(),
            id: id.to_string(),
        })?;
    Ok(Json(MessageResponse::from(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::messages::Folder;
    use crate::api::models::users::Role;
    use crate::test_utils::{add_auth_headers, create_test_app, create_test_user};
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_send_and_read_message(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let staff = create_test_user(&pool, Role::Staff).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let staff_auth = add_auth_headers(&staff);
        let volunteer_auth = add_auth_headers(&volunteer);

        let response = server
            .post("/api/v1/messages")
            .add_header(&staff_auth[0].0, &staff_auth[0].1)
            .json(&json!({ "recipient_id": volunteer.id, "subject": "Saturday", "body": "Can you cover the till?" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let sent: MessageResponse = response.json();
        assert!(sent.read_at.is_none());

        let unread: UnreadCount = server
            .get("/api/v1/messages/unread-count")
            .add_header(&volunteer_auth[0].0, &volunteer_auth[0].1)
            .await
            .json();
        assert_eq!(unread.unread, 1);

        // Sender opening it does not mark it read
        let as_sender: MessageResponse = server
            .get(&format!("/api/v1/messages/{}", sent.id))
            .add_header(&staff_auth[0].0, &staff_auth[0].1)
            .await
            .json();
        assert!(as_sender.read_at.is_none());

        let as_recipient: MessageResponse = server
            .get(&format!("/api/v1/messages/{}", sent.id))
            .add_header(&volunteer_auth[0].0, &volunteer_auth[0].1)
            .await
            .json();
        assert!(as_recipient.read_at.is_some());

        let unread: UnreadCount = server
            .get("/api/v1/messages/unread-count")
            .add_header(&volunteer_auth[0].0, &volunteer_auth[0].1)
            .await
            .json();
        assert_eq!(unread.unread, 0);

        let sent_folder: PaginatedResponse<MessageResponse> = server
            .get("/api/v1/messages?folder=sent")
            .add_header(&staff_auth[0].0, &staff_auth[0].1)
            .await
            .json();
        assert_eq!(sent_folder.total_count, 1);

        let inbox: PaginatedResponse<MessageResponse> = server
            .get("/api/v1/messages")
            .add_header(&staff_auth[0].0, &staff_auth[0].1)
            .await
            .json();
        assert_eq!(inbox.total_count, 0);
        assert_eq!(Folder::default(), Folder::Inbox);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_message_privacy_and_validation(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let alice = create_test_user(&pool, Role::Volunteer).await;
        let bob = create_test_user(&pool, Role::Volunteer).await;
        let eve = create_test_user(&pool, Role::Volunteer).await;
        let alice_auth = add_auth_headers(&alice);
        let eve_auth = add_auth_headers(&eve);

        server
            .post("/api/v1/messages")
            .add_header(&alice_auth[0].0, &alice_auth[0].1)
            .json(&json!({ "recipient_id": uuid::Uuid::new_v4(), "subject": "Hi", "body": "Hello" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        server
            .post("/api/v1/messages")
            .add_header(&alice_auth[0].0, &alice_auth[0].1)
            .json(&json!({ "recipient_id": alice.id, "subject": "Hi", "body": "Hello" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let sent: MessageResponse = server
            .post("/api/v1/messages")
            .add_header(&alice_auth[0].0, &alice_auth[0].1)
            .json(&json!({ "recipient_id": bob.id, "subject": "Hi", "body": "Hello" }))
            .await
            .json();

        server
            .get(&format!("/api/v1/messages/{}", sent.id))
            .add_header(&eve_auth[0].0, &eve_auth[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let notified: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND kind = 'message_received'")
            .bind(bob.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(notified, 1);
    }
}
