//! External artifact storage
//!
//! Binary payloads (avatars, message uploads) live outside the primary store
//! in an unversioned key-value blob store. Uploads happen strictly before the
//! primary-store write that references them; a failed write is compensated by
//! deleting the freshly uploaded key.

use crate::core_room::{ArtifactRef, RoomId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod fs;
pub mod memory;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

/// Errors from the external blob store
#[derive(Debug, Clone, Error)]
pub enum ArtifactError {
    #[error("artifact store I/O failure: {0}")]
    Io(String),

    #[error("malformed artifact reference: {0}")]
    InvalidReference(String),
}

/// An inbound binary payload, not yet stored anywhere
#[derive(Debug, Clone)]
pub struct FilePayload {
    /// Original file name, used for the stored key suffix
    pub name: String,

    /// Raw bytes
    pub data: Vec<u8>,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        FilePayload {
            name: name.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Capability contract for the external blob store
///
/// `delete` must be idempotent: deleting a key that no longer exists is a
/// no-op, never an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a payload under a fresh key owned by the given room
    async fn put(&self, payload: &FilePayload, owner: &RoomId) -> Result<ArtifactRef, ArtifactError>;

    /// Delete a stored payload by key
    async fn delete(&self, key: &str) -> Result<(), ArtifactError>;

    /// Extract the deletion key from a reference URL
    fn key_of(&self, url: &str) -> Result<String, ArtifactError>;
}

/// Sequences uploads and their compensation against the blob store
///
/// Never talks to the primary data store.
#[derive(Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload a payload; the returned reference is committed externally once
    /// this returns
    pub async fn upload(
        &self,
        payload: &FilePayload,
        owner: &RoomId,
    ) -> Result<ArtifactRef, ArtifactError> {
        let artifact = self.store.put(payload, owner).await?;
        tracing::debug!(room = %owner, key = %artifact.key, bytes = artifact.bytes, "artifact uploaded");
        metrics::counter!(crate::metrics::ARTIFACTS_UPLOADED).increment(1);
        Ok(artifact)
    }

    /// Delete a stored payload; idempotent
    pub async fn remove(&self, key: &str) -> Result<(), ArtifactError> {
        self.store.delete(key).await?;
        tracing::debug!(key = %key, "artifact removed");
        Ok(())
    }

    /// Delete the payload behind a reference URL
    pub async fn remove_by_url(&self, url: &str) -> Result<(), ArtifactError> {
        let key = self.store.key_of(url)?;
        self.remove(&key).await
    }

    /// Compensate a failed primary-store write by deleting the artifact it
    /// would have referenced. Failures are logged, not propagated: the
    /// original write error is what the caller reports.
    pub async fn compensate(&self, artifact: &ArtifactRef) {
        metrics::counter!(crate::metrics::ARTIFACTS_COMPENSATED).increment(1);
        if let Err(e) = self.remove(&artifact.key).await {
            tracing::warn!(key = %artifact.key, error = %e, "artifact compensation failed");
        } else {
            tracing::info!(key = %artifact.key, "compensated orphaned artifact");
        }
    }

    /// Best-effort deletion after a committed destroy; failures are logged
    pub async fn remove_best_effort(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.remove(key).await {
                tracing::warn!(key = %key, error = %e, "external artifact deletion failed");
            }
        }
    }
}
