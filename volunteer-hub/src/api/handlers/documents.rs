//! Document uploads and downloads.
//!
//! Metadata is stored in the `documents` table and content goes through the configured
//! [`crate::db::handlers::document_storage::DocumentStore`]. Uploads are hashed and size-checked
//! while the multipart stream is read, so an oversized file is rejected as soon as it crosses
//! the limit.

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::Response,
};
use bytes::BytesMut;
use sha2::{Digest, Sha256};

use crate::{
    AppState,
    api::models::{
        documents::{DocumentResponse, DocumentUpload, ListDocumentsQuery},
        pagination::PaginatedResponse,
        users::CurrentUser,
    },
    audit::{self, AuditEntry},
    auth::permissions::{self, RequiresPermission, operation, resource},
    db::{
        handlers::{Documents, documents::DocumentFilter},
        models::documents::{DocumentCreateDBRequest, DocumentDBResponse},
    },
    errors::{Error, Result},
    types::{DocumentId, Operation, Resource},
};

fn document_not_found(id: DocumentId) -> Error {
    Error::NotFound {
        resource: "Document".to_string(),
        id: id.to_string(),
    }
}

fn multipart_error(e: impl std::fmt::Display) -> Error {
    Error::BadRequest {
        message: format!("Failed to parse multipart data: {e}"),
    }
}

/// Load a document the caller may see. Other users' documents look missing.
async fn visible_document(state: &AppState, user: &CurrentUser, id: DocumentId) -> Result<DocumentDBResponse> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Documents::new(&mut conn)
        .get_by_id(id)
        .await?
        .filter(|d| d.owner_id == user.id || permissions::can_read_all_resources(user, Resource::Documents))
        .ok_or_else(|| document_not_found(id))
}

/// Upload a document
///
/// Multipart form with a `file` part and an optional `category` text part. The content type
/// is taken from the part, or guessed from the filename.
#[utoipa::path(
    post,
    path = "/documents",
    tag = "documents",
    request_body(content = DocumentUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Document stored", body = DocumentResponse),
        (status = 400, description = "Missing file or file too large"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn upload_document(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Documents, operation::CreateOwn>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    let max_bytes = state.config.limits.max_document_bytes;

    let mut filename: Option<String> = None;
    let mut declared_type: Option<String> = None;
    let mut category: Option<String> = None;
    let mut content = BytesMut::new();
    let mut hasher = Sha256::new();
    let mut saw_file = false;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                saw_file = true;
                filename = field.file_name().map(str::to_string);
                declared_type = field.content_type().map(str::to_string);

                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if (content.len() + chunk.len()) as u64 > max_bytes {
                        return Err(Error::BadRequest {
                            message: format!("Document exceeds the maximum size of {max_bytes} bytes"),
                        });
                    }
                    hasher.update(&chunk);
                    content.extend_from_slice(&chunk);
                }
            }
            "category" => {
                let text = field.text().await.map_err(multipart_error)?;
                category = Some(text.trim().to_string()).filter(|c| !c.is_empty());
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    if !saw_file {
        return Err(Error::BadRequest {
            message: "Multipart form must contain a 'file' part".to_string(),
        });
    }

    let filename = filename
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| "document".to_string());
    let content_type = declared_type
        .filter(|t| t != "application/octet-stream")
        .unwrap_or_else(|| mime_guess::from_path(&filename).first_or_octet_stream().to_string());
    let sha256 = format!("{:x}", hasher.finalize());
    let size_bytes = content.len() as i64;

    let storage_key = state.document_store.put(&content).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let created = Documents::new(&mut conn)
        .create(&DocumentCreateDBRequest {
            owner_id: current_user.id,
            filename,
            content_type,
            size_bytes,
            sha256,
            storage_key: storage_key.clone(),
            category,
        })
        .await;

    let document = match created {
        Ok(document) => document,
        Err(e) => {
            // Metadata insert failed, don't leave orphaned content behind
            if let Err(cleanup) = state.document_store.delete(&storage_key).await {
                tracing::warn!(error = %cleanup, "Failed to remove content after metadata insert failed");
            }
            return Err(e.into());
        }
    };

    tracing::info!(document_id = %document.id, size_bytes, "Document uploaded");
    Ok((StatusCode::CREATED, Json(DocumentResponse::from(document))))
}

/// List documents
///
/// Callers see their own documents. Staff may list everyone's, or one owner's with `owner_id`.
#[utoipa::path(
    get,
    path = "/documents",
    tag = "documents",
    params(ListDocumentsQuery),
    responses(
        (status = 200, description = "Page of document metadata", body = PaginatedResponse<DocumentResponse>),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListDocumentsQuery>,
    current_user: RequiresPermission<resource::Documents, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<DocumentResponse>>> {
    let owner_id = if permissions::can_read_all_resources(&current_user, Resource::Documents) {
        query.owner_id
    } else {
        Some(current_user.id)
    };
    let (skip, limit) = query.pagination.params();
    let filter = DocumentFilter {
        skip,
        limit,
        owner_id,
        category: query.category,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Documents::new(&mut conn);
    let documents = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        documents.into_iter().map(DocumentResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get document metadata
#[utoipa::path(
    get,
    path = "/documents/{id}",
    tag = "documents",
    params(("id" = uuid::Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document metadata", body = DocumentResponse),
        (status = 404, description = "Document not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
    current_user: RequiresPermission<resource::Documents, operation::ReadOwn>,
) -> Result<Json<DocumentResponse>> {
    let document = visible_document(&state, &current_user, id).await?;
    Ok(Json(DocumentResponse::from(document)))
}

/// Download document content
#[utoipa::path(
    get,
    path = "/documents/{id}/content",
    tag = "documents",
    params(("id" = uuid::Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document content", content_type = "application/octet-stream"),
        (status = 404, description = "Document not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_document_content(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
    current_user: RequiresPermission<resource::Documents, operation::ReadOwn>,
) -> Result<Response> {
    let document = visible_document(&state, &current_user, id).await?;
    let content = state.document_store.get(&document.storage_key).await?;

    let disposition = format!("attachment; filename=\"{}\"", document.filename.replace(['"', '\\', '\r', '\n'], "_"));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, document.content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(content))
        .map_err(|e| Error::Other(e.into()))
}

/// Delete a document
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    tag = "documents",
    params(("id" = uuid::Uuid, Path, description = "Document ID")),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 404, description = "Document not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
    current_user: RequiresPermission<resource::Documents, operation::DeleteOwn>,
) -> Result<StatusCode> {
    let document = visible_document(&state, &current_user, id).await?;
    let owned = document.owner_id == current_user.id;
    if !owned {
        permissions::require(&current_user, Resource::Documents, Operation::DeleteAll)?;
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deleted = Documents::new(&mut conn).delete(id).await?.ok_or_else(|| document_not_found(id))?;
    drop(conn);

    if let Err(e) = state.document_store.delete(&deleted.storage_key).await {
        tracing::warn!(document_id = %id, error = %e, "Document row deleted but content removal failed");
    }

    if !owned {
        audit::record(
            &state.db,
            &current_user,
            AuditEntry::new("document.delete", "document", id).with_details(serde_json::json!({ "owner_id": deleted.owner_id })),
        )
        .await;
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{add_auth_headers, create_test_admin_user, create_test_app, create_test_user};
    use axum_test::multipart::{MultipartForm, Part};
    use sqlx::PgPool;

    fn upload_form(content: &[u8], filename: &str) -> MultipartForm {
        MultipartForm::new()
            .add_text("category", "dbs-check")
            .add_part("file", Part::bytes(content.to_vec()).file_name(filename))
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_upload_download_and_delete(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let auth = add_auth_headers(&volunteer);

        let response = server
            .post("/api/v1/documents")
            .add_header(&auth[0].0, &auth[0].1)
            .multipart(upload_form(b"%PDF-1.4 certificate", "certificate.pdf"))
            .await;
        response.assert_status(StatusCode::CREATED);
        let document: DocumentResponse = response.json();
        assert_eq!(document.owner_id, volunteer.id);
        assert_eq!(document.filename, "certificate.pdf");
        assert_eq!(document.content_type, "application/pdf");
        assert_eq!(document.size_bytes, 20);
        assert_eq!(document.category.as_deref(), Some("dbs-check"));
        assert_eq!(document.sha256, format!("{:x}", Sha256::digest(b"%PDF-1.4 certificate")));

        let content = server
            .get(&format!("/api/v1/documents/{}/content", document.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await;
        content.assert_status_ok();
        assert_eq!(content.as_bytes().as_ref(), b"%PDF-1.4 certificate");
        assert_eq!(content.header("content-type"), "application/pdf");

        server
            .delete(&format!("/api/v1/documents/{}", document.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get(&format!("/api/v1/documents/{}", document.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_oversized_upload_rejected(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let auth = add_auth_headers(&volunteer);

        // Test config allows 1 MiB
        let too_big = vec![b'x'; 1024 * 1024 + 1];
        server
            .post("/api/v1/documents")
            .add_header(&auth[0].0, &auth[0].1)
            .multipart(upload_form(&too_big, "big.txt"))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .post("/api/v1/documents")
            .add_header(&auth[0].0, &auth[0].1)
            .multipart(MultipartForm::new().add_text("category", "orphan"))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_documents_are_private_to_owner(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let owner = create_test_user(&pool, Role::Donor).await;
        let other = create_test_user(&pool, Role::Volunteer).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let owner_auth = add_auth_headers(&owner);
        let other_auth = add_auth_headers(&other);
        let admin_auth = add_auth_headers(&admin);

        let document: DocumentResponse = server
            .post("/api/v1/documents")
            .add_header(&owner_auth[0].0, &owner_auth[0].1)
            .multipart(upload_form(b"gift aid declaration", "gift-aid.txt"))
            .await
            .json();

        server
            .get(&format!("/api/v1/documents/{}/content", document.id))
            .add_header(&other_auth[0].0, &other_auth[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let page: PaginatedResponse<DocumentResponse> = server
            .get("/api/v1/documents")
            .add_header(&other_auth[0].0, &other_auth[0].1)
            .await
            .json();
        assert_eq!(page.total_count, 0);

        let page: PaginatedResponse<DocumentResponse> = server
            .get(&format!("/api/v1/documents?owner_id={}", owner.id))
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .await
            .json();
        assert_eq!(page.total_count, 1);

        server
            .delete(&format!("/api/v1/documents/{}", document.id))
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let audited: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE action = 'document.delete'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(audited, 1);
    }
}
