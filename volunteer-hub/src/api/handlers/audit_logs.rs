use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    api::models::{
        audit_logs::{AuditLogResponse, ListAuditLogsQuery},
        pagination::PaginatedResponse,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::handlers::{AuditLogs, audit_logs::AuditLogFilter},
    errors::{Error, Result},
};

/// Search the audit trail
///
/// Entries are returned newest first. All filters are optional and combine with AND.
#[utoipa::path(
    get,
    path = "/admin/audit-logs",
    tag = "audit_logs",
    params(ListAuditLogsQuery),
    responses(
        (status = 200, description = "Page of audit entries", body = PaginatedResponse<AuditLogResponse>),
        (status = 403, description = "Admin only"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<ListAuditLogsQuery>,
    _: RequiresPermission<resource::AuditLogs, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<AuditLogResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = AuditLogFilter {
        skip,
        limit,
        actor_id: query.actor_id,
        action: query.action,
        entity_type: query.entity_type,
        since: query.since,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = AuditLogs::new(&mut conn);
    let entries = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        entries.into_iter().map(AuditLogResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{add_auth_headers, create_test_admin_user, create_test_app, create_test_user};
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_actions_are_audited(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let staff = create_test_user(&pool, Role::Staff).await;
        let auth = add_auth_headers(&admin);
        let staff_auth = add_auth_headers(&staff);

        let task: serde_json::Value = server
            .post("/api/v1/tasks")
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "title": "Count the float" }))
            .await
            .json();
        server
            .delete(&format!("/api/v1/tasks/{}", task["id"].as_str().unwrap()))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .get("/api/v1/admin/audit-logs")
            .add_header(&staff_auth[0].0, &staff_auth[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let page: PaginatedResponse<AuditLogResponse> = server
            .get(&format!("/api/v1/admin/audit-logs?action=task.delete&actor_id={}", admin.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0].entity_type, "task");
        assert_eq!(page.data[0].entity_id.as_deref(), task["id"].as_str());

        let none: PaginatedResponse<AuditLogResponse> = server
            .get("/api/v1/admin/audit-logs?entity_type=shift")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert_eq!(none.total_count, 0);
    }
}
