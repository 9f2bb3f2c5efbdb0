//! In-memory object store for tests and the harness
//!
//! Records every put and delete so tests can assert on upload ordering and
//! compensation behavior.

use super::{ArtifactError, FilePayload, ObjectStore};
use crate::core_room::{ArtifactRef, RoomId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

const URL_SCHEME: &str = "mem://";

/// Blob store backed by a hash map
#[derive(Default)]
pub struct MemoryObjectStore {
    inner: Mutex<InnerState>,
}

#[derive(Default)]
struct InnerState {
    blobs: HashMap<String, Vec<u8>>,
    put_count: u64,
    deleted_keys: Vec<String>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a payload is currently stored under the key
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().unwrap().blobs.contains_key(key)
    }

    /// Number of successful puts so far
    pub fn put_count(&self) -> u64 {
        self.inner.lock().unwrap().put_count
    }

    /// Keys passed to delete, in order, including repeats
    pub fn deleted_keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted_keys.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, payload: &FilePayload, owner: &RoomId) -> Result<ArtifactRef, ArtifactError> {
        use rand::RngCore;
        let mut nonce = [0u8; 8];
        rand::rng().fill_bytes(&mut nonce);

        let key = format!("{}/{}-{}", owner, hex::encode(nonce), payload.name);
        let mut inner = self.inner.lock().unwrap();
        inner.blobs.insert(key.clone(), payload.data.clone());
        inner.put_count += 1;

        Ok(ArtifactRef {
            url: format!("{URL_SCHEME}{key}"),
            key,
            bytes: payload.size(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), ArtifactError> {
        let mut inner = self.inner.lock().unwrap();
        inner.deleted_keys.push(key.to_string());
        // Removing an absent key is a no-op
        inner.blobs.remove(key);
        Ok(())
    }

    fn key_of(&self, url: &str) -> Result<String, ArtifactError> {
        url.strip_prefix(URL_SCHEME)
            .map(str::to_string)
            .ok_or_else(|| ArtifactError::InvalidReference(url.to_string()))
    }
}
