//! Repository contract for resource collections

use crate::core::error::RepositoryError;
use crate::core::query::{ListQuery, Page};
use crate::core::resource::{Resource, ResourcePayload};
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// CRUD storage for one resource collection, guarded by version fencing.
///
/// Implementations must make `update` and `delete` a single atomic
/// check-and-set against the stored version: two writers presenting the same
/// `expected_version` can never both succeed. A failed call leaves no visible
/// state change.
#[async_trait]
pub trait ResourceRepository<P: ResourcePayload>: Send + Sync {
    /// Store a new resource at version 1
    ///
    /// Fails with `Validation` before anything is written.
    async fn create(&self, owner_id: Uuid, payload: P) -> Result<Resource<P>, RepositoryError>;

    /// Get a resource by ID
    async fn get(&self, id: &Uuid) -> Result<Resource<P>, RepositoryError>;

    /// List resources ordered by (created_at, id)
    async fn list(&self, query: &ListQuery) -> Result<Page<Resource<P>>, RepositoryError>;

    /// Apply a JSON merge patch if the stored version equals `expected_version`
    ///
    /// On success the version is incremented and `updated_at` refreshed in the
    /// same write.
    async fn update(
        &self,
        id: &Uuid,
        expected_version: u64,
        patch: &Value,
    ) -> Result<Resource<P>, RepositoryError>;

    /// Remove a resource if the stored version equals `expected_version`
    async fn delete(&self, id: &Uuid, expected_version: u64) -> Result<(), RepositoryError>;
}
