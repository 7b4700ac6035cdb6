//! Resource registry: maps resource type names to type-erased handlers
//!
//! The pipeline works with JSON envelopes while repositories are typed per
//! payload. A [`ResourceHandler`] bridges the two for one collection.

use crate::core::error::{ApiError, RepositoryError, ValidationError};
use crate::core::query::ListQuery;
use crate::core::repository::ResourceRepository;
use crate::core::resource::ResourcePayload;
use crate::core::validation::{PayloadSchema, ValidationMode};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// JSON-level operations on one resource collection
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// The resource type name (e.g., "note")
    fn resource_type(&self) -> &'static str;

    fn schema(&self) -> PayloadSchema;

    /// Full validation of a create payload; returns the normalized document
    fn validate_create(&self, payload: Value) -> Result<Value, ValidationError>;

    /// Partial validation of a merge patch; returns the normalized patch
    fn validate_patch(&self, patch: Value) -> Result<Value, ValidationError>;

    /// Owner of a stored resource, `None` when it does not exist
    async fn owner_of(&self, id: &Uuid) -> Result<Option<Uuid>, ApiError>;

    async fn create(&self, owner_id: Uuid, payload: Value) -> Result<Value, ApiError>;

    async fn get(&self, id: &Uuid) -> Result<Value, ApiError>;

    async fn list(&self, query: &ListQuery) -> Result<Value, ApiError>;

    async fn update(
        &self,
        id: &Uuid,
        expected_version: u64,
        patch: &Value,
    ) -> Result<Value, ApiError>;

    async fn delete(&self, id: &Uuid, expected_version: u64) -> Result<(), ApiError>;
}

/// [`ResourceHandler`] over a typed repository
pub struct TypedResourceHandler<P: ResourcePayload> {
    repository: Arc<dyn ResourceRepository<P>>,
    _payload: PhantomData<fn() -> P>,
}

impl<P: ResourcePayload> TypedResourceHandler<P> {
    pub fn new(repository: Arc<dyn ResourceRepository<P>>) -> Self {
        Self {
            repository,
            _payload: PhantomData,
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(ApiError::internal)
}

#[async_trait]
impl<P: ResourcePayload> ResourceHandler for TypedResourceHandler<P> {
    fn resource_type(&self) -> &'static str {
        P::resource_type()
    }

    fn schema(&self) -> PayloadSchema {
        P::schema()
    }

    fn validate_create(&self, payload: Value) -> Result<Value, ValidationError> {
        let typed = P::from_document(payload, ValidationMode::Full)?;
        serde_json::to_value(&typed)
            .map_err(|e| ValidationError::single("payload", e.to_string()))
    }

    fn validate_patch(&self, patch: Value) -> Result<Value, ValidationError> {
        P::schema().validate_and_filter(patch, ValidationMode::Patch)
    }

    async fn owner_of(&self, id: &Uuid) -> Result<Option<Uuid>, ApiError> {
        match self.repository.get(id).await {
            Ok(resource) => Ok(Some(resource.owner_id)),
            Err(RepositoryError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, owner_id: Uuid, payload: Value) -> Result<Value, ApiError> {
        let typed = P::from_document(payload, ValidationMode::Full)?;
        let resource = self.repository.create(owner_id, typed).await?;
        to_json(&resource)
    }

    async fn get(&self, id: &Uuid) -> Result<Value, ApiError> {
        let resource = self.repository.get(id).await?;
        to_json(&resource)
    }

    async fn list(&self, query: &ListQuery) -> Result<Value, ApiError> {
        let page = self.repository.list(query).await?;
        to_json(&page)
    }

    async fn update(
        &self,
        id: &Uuid,
        expected_version: u64,
        patch: &Value,
    ) -> Result<Value, ApiError> {
        let resource = self.repository.update(id, expected_version, patch).await?;
        to_json(&resource)
    }

    async fn delete(&self, id: &Uuid, expected_version: u64) -> Result<(), ApiError> {
        Ok(self.repository.delete(id, expected_version).await?)
    }
}

/// Registry for all resource collections in the application
#[derive(Default, Clone)]
pub struct ResourceRegistry {
    handlers: BTreeMap<String, Arc<dyn ResourceHandler>>,
}

impl ResourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; the resource type name is the key and a second
    /// registration under the same name replaces the first
    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) {
        self.handlers
            .insert(handler.resource_type().to_string(), handler);
    }

    /// Register a typed repository
    pub fn register_repository<P, R>(&mut self, repository: R)
    where
        P: ResourcePayload,
        R: ResourceRepository<P> + 'static,
    {
        let repository: Arc<dyn ResourceRepository<P>> = Arc::new(repository);
        self.register(Arc::new(TypedResourceHandler::new(repository)));
    }

    pub fn get(&self, resource_type: &str) -> Option<Arc<dyn ResourceHandler>> {
        self.handlers.get(resource_type).cloned()
    }

    /// Registered resource types, sorted
    pub fn resource_types(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn ResourceHandler>> {
        self.handlers.values()
    }
}
