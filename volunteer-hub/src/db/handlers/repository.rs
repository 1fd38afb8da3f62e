//! The CRUD shape shared by table repositories.

use crate::db::errors::Result;

/// CRUD over one table, borrowed from a connection or transaction for the length of a handler.
///
/// Repositories whose table doesn't fit this shape (append-only logs, token tables) expose
/// inherent methods instead.
#[async_trait::async_trait]
pub trait Repository {
    type CreateRequest;
    type UpdateRequest;
    type Response;
    type Id: Send + Sync;
    /// Pagination plus whatever narrowing the table supports
    type Filter: Send + Sync;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// Returns `false` when no row matched.
    async fn delete(&mut self, id: Self::Id) -> Result<bool>;

    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;
}
