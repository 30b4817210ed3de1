use crate::db::errors::Result;
use async_trait::async_trait;

/// Common CRUD surface for the row-owning repositories.
///
/// Repositories borrow a `PgConnection` for their lifetime, so a caller can
/// hand them either a pooled connection or an open transaction and keep
/// control over commit boundaries.
#[async_trait]
pub trait Repository {
    type CreateRequest: Send + Sync;
    type UpdateRequest: Send + Sync;
    type Response: Send;
    type Id: Send + 'static;
    type Filter: Send + Sync;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;

    /// Returns false when the row did not exist.
    async fn delete(&mut self, id: Self::Id) -> Result<bool>;
}
