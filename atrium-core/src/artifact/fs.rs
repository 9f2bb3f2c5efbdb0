//! Filesystem-backed object store
//!
//! Payloads are stored under `<root>/<room-hex>/<nonce>-<name>`; the key is
//! the path relative to the root.

use super::{ArtifactError, FilePayload, ObjectStore};
use crate::core_room::{ArtifactRef, RoomId};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

const URL_SCHEME: &str = "fs://";

/// Blob store rooted at a local directory
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(key);
        // Keys never escape the root
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ArtifactError::InvalidReference(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, payload: &FilePayload, owner: &RoomId) -> Result<ArtifactRef, ArtifactError> {
        use rand::RngCore;
        let mut nonce = [0u8; 8];
        rand::rng().fill_bytes(&mut nonce);

        let file_name: String = payload
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let key = format!("{}/{}-{}", owner, hex::encode(nonce), file_name);
        let path = self.resolve(&key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArtifactError::Io(e.to_string()))?;
        }
        tokio::fs::write(&path, &payload.data)
            .await
            .map_err(|e| ArtifactError::Io(e.to_string()))?;

        Ok(ArtifactRef {
            url: format!("{URL_SCHEME}{key}"),
            key,
            bytes: payload.size(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), ArtifactError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Removing an absent key is a no-op
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArtifactError::Io(e.to_string())),
        }
    }

    fn key_of(&self, url: &str) -> Result<String, ArtifactError> {
        url.strip_prefix(URL_SCHEME)
            .map(str::to_string)
            .ok_or_else(|| ArtifactError::InvalidReference(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let room = RoomId::generate();

        let artifact = store
            .put(&FilePayload::new("avatar.png", vec![9; 16]), &room)
            .await
            .unwrap();
        assert_eq!(artifact.bytes, 16);

        let stored = dir.path().join(&artifact.key);
        assert!(stored.exists());

        store.delete(&artifact.key).await.unwrap();
        assert!(!stored.exists());

        // Idempotent second delete
        store.delete(&artifact.key).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(store.delete("../outside").await.is_err());
    }
}
