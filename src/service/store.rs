//! Persistence seam for the change-request aggregate.
//!
//! Storage is an external collaborator reached through a narrow contract:
//! load a snapshot, save it back with an optimistic version check. The
//! in-memory implementation ships for tests and small deployments; durable
//! stores live with the embedding application.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::tracker::ArtifactSet;
use crate::types::{ChangeRequest, RequestId};

/// The persisted unit: the aggregate plus its tracked artifacts, versioned
/// for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRequest {
    pub request: ChangeRequest,
    pub artifacts: ArtifactSet,
    pub version: u64,
}

/// Errors from the persistence collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The snapshot being saved was loaded from an older version.
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    /// A snapshot with this id already exists.
    #[error("request {id} already exists")]
    AlreadyExists { id: RequestId },
}

/// Narrow persistence contract for change-request snapshots.
pub trait RequestStore {
    /// Allocates a fresh request id.
    fn allocate_id(&self) -> impl Future<Output = RequestId> + Send;

    /// Inserts a new snapshot. Fails if the id is taken.
    fn create(&self, snapshot: StoredRequest) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Loads the current snapshot for a request.
    fn load(&self, id: RequestId) -> impl Future<Output = Option<StoredRequest>> + Send;

    /// Saves a snapshot atomically, covering the request and every artifact
    /// row touched in the call. The stored version must match the loaded
    /// one; the returned snapshot carries the bumped version.
    fn save(
        &self,
        snapshot: StoredRequest,
    ) -> impl Future<Output = Result<StoredRequest, StoreError>> + Send;
}

/// In-memory store keyed by request id.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    requests: RwLock<HashMap<RequestId, StoredRequest>>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl RequestStore for InMemoryStore {
    async fn allocate_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn create(&self, snapshot: StoredRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        let id = snapshot.request.id;
        if requests.contains_key(&id) {
            return Err(StoreError::AlreadyExists { id });
        }
        requests.insert(id, snapshot);
        Ok(())
    }

    async fn load(&self, id: RequestId) -> Option<StoredRequest> {
        self.requests.read().await.get(&id).cloned()
    }

    async fn save(&self, mut snapshot: StoredRequest) -> Result<StoredRequest, StoreError> {
        let mut requests = self.requests.write().await;
        let id = snapshot.request.id;

        if let Some(existing) = requests.get(&id) {
            if existing.version != snapshot.version {
                return Err(StoreError::VersionConflict {
                    expected: snapshot.version,
                    found: existing.version,
                });
            }
        }

        snapshot.version += 1;
        requests.insert(id, snapshot.clone());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::draft_request;

    fn snapshot(id: u64) -> StoredRequest {
        StoredRequest {
            request: draft_request(id),
            artifacts: ArtifactSet::new(),
            version: 0,
        }
    }

    #[tokio::test]
    async fn allocated_ids_are_distinct() {
        let store = InMemoryStore::new();
        let a = store.allocate_id().await;
        let b = store.allocate_id().await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_then_load_roundtrips() {
        let store = InMemoryStore::new();
        let snapshot = snapshot(1);
        store.create(snapshot.clone()).await.unwrap();

        let loaded = store.load(snapshot.request.id).await.unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn duplicate_create_is_refused() {
        let store = InMemoryStore::new();
        store.create(snapshot(1)).await.unwrap();

        let result = store.create(snapshot(1)).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn save_bumps_the_version() {
        let store = InMemoryStore::new();
        store.create(snapshot(1)).await.unwrap();

        let loaded = store.load(RequestId(1)).await.unwrap();
        let saved = store.save(loaded).await.unwrap();
        assert_eq!(saved.version, 1);
    }

    #[tokio::test]
    async fn stale_save_is_a_version_conflict() {
        let store = InMemoryStore::new();
        store.create(snapshot(1)).await.unwrap();

        let first = store.load(RequestId(1)).await.unwrap();
        let second = first.clone();

        store.save(first).await.unwrap();
        let result = store.save(second).await;
        assert!(matches!(
            result,
            Err(StoreError::VersionConflict {
                expected: 0,
                found: 1
            })
        ));
    }
}
