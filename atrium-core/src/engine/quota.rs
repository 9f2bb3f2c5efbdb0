//! Quota evaluator
//!
//! Strict "would-exceed" predicates over live aggregates: landing exactly on
//! the limit is allowed, going past it is not. The aggregates are derived at
//! evaluation time; the final line of defense is the write guard re-checked
//! inside the store transaction.

use super::RoomEngine;
use crate::core_room::Room;
use crate::engine::EngineError;
use crate::store::{Metric, RoomStore};

/// `current + delta > limit`, saturating on overflow
fn would_exceed(current: u64, delta: u64, limit: u64) -> bool {
    current.saturating_add(delta) > limit
}

impl RoomEngine {
    /// Whether a single payload of `bytes` breaks the per-file limit
    pub fn file_exceeds_single_file_size(&self, room: &Room, bytes: u64) -> bool {
        bytes > room.quotas.single_file_bytes_allowed
    }

    /// Whether adding `bytes` would break the room's cumulative file budget
    pub async fn file_exceeds_total_files_limit(
        &self,
        room: &Room,
        bytes: u64,
    ) -> Result<bool, EngineError> {
        let current = self.store.aggregate(&room.id, Metric::FileBytesTotal).await?;
        Ok(would_exceed(current, bytes, room.quotas.total_files_bytes_allowed))
    }

    /// Whether adding `add_count` members would break the room's member limit
    pub async fn room_user_count_exceeds_limit(
        &self,
        room: &Room,
        add_count: u64,
    ) -> Result<bool, EngineError> {
        let current = self.store.aggregate(&room.id, Metric::MemberCount).await?;
        Ok(would_exceed(current, add_count, room.quotas.max_users))
    }

    /// Whether adding `add_count` channels would break the room's channel limit
    pub async fn channel_count_exceeds_limit(
        &self,
        room: &Room,
        add_count: u64,
    ) -> Result<bool, EngineError> {
        let current = self.store.aggregate(&room.id, Metric::ChannelCount).await?;
        Ok(would_exceed(current, add_count, room.quotas.max_channels))
    }

    /// Run both file-size predicates for a prospective payload, in order
    pub(super) async fn check_file_quotas(
        &self,
        room: &Room,
        bytes: u64,
    ) -> Result<(), EngineError> {
        if self.file_exceeds_single_file_size(room, bytes) {
            metrics::counter!(crate::metrics::QUOTA_REJECTIONS).increment(1);
            return Err(EngineError::ExceedsSingleFileSize);
        }
        if self.file_exceeds_total_files_limit(room, bytes).await? {
            metrics::counter!(crate::metrics::QUOTA_REJECTIONS).increment(1);
            return Err(EngineError::ExceedsRoomTotalFilesLimit);
        }
        Ok(())
    }

    /// Both file-size predicates for a room that is not in the store yet
    ///
    /// The cumulative balance is zero, so no aggregate read is needed. The
    /// total bound still applies: quotas are caller-supplied and the single
    /// limit may sit above the total.
    pub(super) fn check_initial_file_quotas(
        &self,
        room: &Room,
        bytes: u64,
    ) -> Result<(), EngineError> {
        if self.file_exceeds_single_file_size(room, bytes) {
            metrics::counter!(crate::metrics::QUOTA_REJECTIONS).increment(1);
            return Err(EngineError::ExceedsSingleFileSize);
        }
        if would_exceed(0, bytes, room.quotas.total_files_bytes_allowed) {
            metrics::counter!(crate::metrics::QUOTA_REJECTIONS).increment(1);
            return Err(EngineError::ExceedsRoomTotalFilesLimit);
        }
        Ok(())
    }

    pub(super) fn quota_rejected(&self, err: EngineError) -> EngineError {
        metrics::counter!(crate::metrics::QUOTA_REJECTIONS).increment(1);
        err
    }
}
