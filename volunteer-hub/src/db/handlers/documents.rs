//! Database repository for document metadata.

use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::Result,
        models::documents::{DocumentCreateDBRequest, DocumentDBResponse},
    },
    types::{DocumentId, UserId, abbrev_uuid},
};

#[derive(Debug, Clone)]
pub struct DocumentFilter {
    pub skip: i64,
    pub limit: i64,
    pub owner_id: Option<UserId>,
    pub category: Option<String>,
}

pub struct Documents<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Documents<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(owner_id = %abbrev_uuid(&request.owner_id), size = request.size_bytes), err)]
    pub async fn create(&mut self, request: &DocumentCreateDBRequest) -> Result<DocumentDBResponse> {
        let document = sqlx::query_as::<_, DocumentDBResponse>(
            r#"
            INSERT INTO documents (id, owner_id, filename, content_type, size_bytes, sha256, storage_key, category)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.owner_id)
        .bind(&request.filename)
        .bind(&request.content_type)
        .bind(request.size_bytes)
        .bind(&request.sha256)
        .bind(&request.storage_key)
        .bind(&request.category)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(document)
    }

    #[instrument(skip(self), fields(document_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: DocumentId) -> Result<Option<DocumentDBResponse>> {
        let document = sqlx::query_as::<_, DocumentDBResponse>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(document)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &DocumentFilter) -> Result<Vec<DocumentDBResponse>> {
        let documents = sqlx::query_as::<_, DocumentDBResponse>(
            r#"
            SELECT * FROM documents
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::text IS NULL OR category = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.owner_id)
        .bind(&filter.category)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(documents)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &DocumentFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM documents
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::text IS NULL OR category = $2)
            "#,
        )
        .bind(filter.owner_id)
        .bind(&filter.category)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Delete the metadata row, returning it so the caller can remove the stored content.
    #[instrument(skip(self), fields(document_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, id: DocumentId) -> Result<Option<DocumentDBResponse>> {
        let document = sqlx::query_as::<_, DocumentDBResponse>("DELETE FROM documents WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(document)
    }

    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn list_for_owner(&mut self, owner_id: UserId) -> Result<Vec<DocumentDBResponse>> {
        let documents = sqlx::query_as::<_, DocumentDBResponse>("SELECT * FROM documents WHERE owner_id = $1 ORDER BY created_at DESC")
            .bind(owner_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_document_metadata_crud(pool: PgPool) {
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Documents::new(&mut conn);

        let created = repo
            .create(&DocumentCreateDBRequest {
                owner_id: volunteer.id,
                filename: "dbs-check.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                size_bytes: 1024,
                sha256: "ab".repeat(32),
                storage_key: "ab/abc.bin".to_string(),
                category: Some("background_check".to_string()),
            })
            .await
            .unwrap();

        let filter = DocumentFilter {
            skip: 0,
            limit: 10,
            owner_id: Some(volunteer.id),
            category: Some("background_check".to_string()),
        };
        assert_eq!(repo.list(&filter).await.unwrap().len(), 1);
        assert_eq!(repo.count(&filter).await.unwrap(), 1);

        let deleted = repo.delete(created.id).await.unwrap().unwrap();
        assert_eq!(deleted.storage_key, "ab/abc.bin");
        assert!(repo.delete(created.id).await.unwrap().is_none());
    }
}
