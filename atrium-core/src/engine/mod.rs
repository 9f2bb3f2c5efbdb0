//! Authorization and resource-quota consistency engine
//!
//! One engine, parameterized over the primary store, the blob store and the
//! identity provider. Every mutation follows the same sequence: resolve the
//! target, check authorization, check quotas, upload any artifact, then apply
//! one atomic write batch. A failed write compensates the upload before the
//! error is surfaced, so no external artifact is ever left referencing
//! nothing.

use crate::artifact::UploadCoordinator;
use crate::core_room::ArtifactRef;
use crate::identity::IdentityProvider;
use crate::store::{RoomStore, WriteBatch};
use std::sync::Arc;

mod authz;
mod channels;
mod error;
mod invites;
mod members;
mod messages;
mod quota;
mod retention;
mod rooms;

#[cfg(test)]
mod tests;

pub use error::EngineError;
pub use retention::SweepReport;
pub use rooms::RoomUpdate;

/// The mutation orchestrator
///
/// Cheap to clone; adapters are shared behind `Arc`.
#[derive(Clone)]
pub struct RoomEngine {
    pub(crate) store: Arc<dyn RoomStore>,
    pub(crate) uploads: UploadCoordinator,
    pub(crate) identity: Arc<dyn IdentityProvider>,
}

impl RoomEngine {
    pub fn new(
        store: Arc<dyn RoomStore>,
        uploads: UploadCoordinator,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            uploads,
            identity,
        }
    }

    /// Read access to the primary store for embedding applications
    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    /// Resolve a credential to a user identity
    pub async fn authenticate(&self, credential: &str) -> Result<crate::core_room::UserId, EngineError> {
        self.identity
            .verify_and_decode(credential)
            .await
            .ok_or(EngineError::InvalidCredentials)
    }

    /// Commit a batch, compensating a fresh upload when the write fails
    ///
    /// The original write error is what the caller sees; compensation
    /// failures are only logged.
    pub(crate) async fn commit(
        &self,
        batch: WriteBatch,
        uploaded: Option<&ArtifactRef>,
    ) -> Result<(), EngineError> {
        match self.store.write_atomic(batch).await {
            Ok(()) => {
                metrics::counter!(crate::metrics::MUTATIONS_APPLIED).increment(1);
                Ok(())
            }
            Err(e) => {
                if let Some(artifact) = uploaded {
                    self.uploads.compensate(artifact).await;
                }
                Err(e.into())
            }
        }
    }
}
