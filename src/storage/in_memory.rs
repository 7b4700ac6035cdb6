//! In-memory implementation of ResourceRepository for testing and development

use crate::core::error::RepositoryError;
use crate::core::query::{Cursor, ListQuery, Page, matches_filter};
use crate::core::repository::ResourceRepository;
use crate::core::resource::{Resource, ResourcePayload};
use crate::core::validation::{ValidationMode, merge_patch};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

struct Collection<P> {
    rows: HashMap<Uuid, Resource<P>>,
    /// (created_at, id) keys in pagination order
    order: BTreeSet<(DateTime<Utc>, Uuid)>,
    last_created_at: Option<DateTime<Utc>>,
}

impl<P> Collection<P> {
    /// Strictly increasing creation timestamps, so new rows always sort last
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created_at {
            Some(last) if now <= last => last + Duration::nanoseconds(1),
            _ => now,
        };
        self.last_created_at = Some(ts);
        ts
    }
}

/// In-memory resource repository
///
/// Useful for testing and development. Every mutation runs under a single
/// write guard, which makes the version check and the write one atomic step.
/// Guards are never held across an `.await`.
pub struct InMemoryResourceRepository<P> {
    inner: Arc<RwLock<Collection<P>>>,
}

impl<P> Clone for InMemoryResourceRepository<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: ResourcePayload> InMemoryResourceRepository<P> {
    /// Create a new, empty repository
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Collection {
                rows: HashMap::new(),
                order: BTreeSet::new(),
                last_created_at: None,
            })),
        }
    }

    /// Number of stored resources
    pub fn len(&self) -> Result<usize, RepositoryError> {
        let collection = self
            .inner
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        Ok(collection.rows.len())
    }

    pub fn is_empty(&self) -> Result<bool, RepositoryError> {
        Ok(self.len()? == 0)
    }

    fn not_found(id: &Uuid) -> RepositoryError {
        RepositoryError::NotFound {
            resource_type: P::resource_type().to_string(),
            id: *id,
        }
    }

    fn check_version(resource: &Resource<P>, expected: u64) -> Result<(), RepositoryError> {
        if resource.version == expected {
            Ok(())
        } else {
            Err(RepositoryError::Conflict {
                resource_type: P::resource_type().to_string(),
                id: resource.id,
                expected,
                actual: resource.version,
            })
        }
    }
}

impl<P: ResourcePayload> Default for InMemoryResourceRepository<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P: ResourcePayload> ResourceRepository<P> for InMemoryResourceRepository<P> {
    async fn create(&self, owner_id: Uuid, payload: P) -> Result<Resource<P>, RepositoryError> {
        payload.check()?;

        let mut collection = self
            .inner
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let created_at = collection.next_created_at();
        let resource = Resource::new(owner_id, payload, created_at);
        collection.order.insert(resource.sort_key());
        collection.rows.insert(resource.id, resource.clone());

        Ok(resource)
    }

    async fn get(&self, id: &Uuid) -> Result<Resource<P>, RepositoryError> {
        let collection = self
            .inner
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        collection
            .rows
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn list(&self, query: &ListQuery) -> Result<Page<Resource<P>>, RepositoryError> {
        query.validate()?;
        let limit = query.page.limit();

        let collection = self
            .inner
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let lower = match &query.page.cursor {
            Some(cursor) => Bound::Excluded(cursor.key()),
            None => Bound::Unbounded,
        };

        let mut items = Vec::with_capacity(limit);
        let mut has_more = false;

        for key in collection.order.range((lower, Bound::Unbounded)) {
            let Some(resource) = collection.rows.get(&key.1) else {
                continue;
            };
            if query.owner_id.is_some_and(|owner| owner != resource.owner_id) {
                continue;
            }
            if let Some(filter) = &query.filter {
                let document =
                    serde_json::to_value(&resource.payload).map_err(anyhow::Error::from)?;
                if !matches_filter(&document, filter) {
                    continue;
                }
            }
            if items.len() == limit {
                has_more = true;
                break;
            }
            items.push(resource.clone());
        }

        let next_cursor = if has_more {
            items.last().map(|r| Cursor::new(r.created_at, r.id))
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    async fn update(
        &self,
        id: &Uuid,
        expected_version: u64,
        patch: &Value,
    ) -> Result<Resource<P>, RepositoryError> {
        let mut collection = self
            .inner
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let resource = collection.rows.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        Self::check_version(resource, expected_version)?;

        let mut document = serde_json::to_value(&resource.payload).map_err(anyhow::Error::from)?;
        merge_patch(&mut document, patch);
        let payload = P::from_document(document, ValidationMode::Full)?;

        let now = Utc::now();
        resource.payload = payload;
        resource.version += 1;
        resource.updated_at = if now > resource.updated_at {
            now
        } else {
            resource.updated_at + Duration::nanoseconds(1)
        };

        Ok(resource.clone())
    }

    async fn delete(&self, id: &Uuid, expected_version: u64) -> Result<(), RepositoryError> {
        let mut collection = self
            .inner
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let resource = collection.rows.get(id).ok_or_else(|| Self::not_found(id))?;
        Self::check_version(resource, expected_version)?;

        let key = resource.sort_key();
        collection.order.remove(&key);
        collection.rows.remove(id);

        Ok(())
    }
}
