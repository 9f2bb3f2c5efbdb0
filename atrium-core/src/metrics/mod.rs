//! Engine metrics
//!
//! Counter names emitted through the `metrics` facade. An exporter is wired
//! by the embedding application; without one the macros are no-ops.

/// Artifacts uploaded to the blob store
pub const ARTIFACTS_UPLOADED: &str = "engine.artifacts.uploaded";

/// Artifacts deleted to compensate a failed primary-store write
pub const ARTIFACTS_COMPENSATED: &str = "engine.artifacts.compensated";

/// Write batches committed by the primary store
pub const MUTATIONS_APPLIED: &str = "engine.mutations.applied";

/// Mutations rejected by an authorization rule
pub const AUTHZ_REJECTIONS: &str = "engine.authz.rejections";

/// Mutations rejected by a quota check or write guard
pub const QUOTA_REJECTIONS: &str = "engine.quota.rejections";

/// Entities removed by the retention sweep
pub const RETENTION_REMOVALS: &str = "engine.retention.removals";

/// Register descriptions for every counter the engine emits
pub fn describe() {
    metrics::describe_counter!(ARTIFACTS_UPLOADED, "Artifacts uploaded to the blob store");
    metrics::describe_counter!(
        ARTIFACTS_COMPENSATED,
        "Artifacts deleted to compensate a failed write"
    );
    metrics::describe_counter!(MUTATIONS_APPLIED, "Write batches committed");
    metrics::describe_counter!(AUTHZ_REJECTIONS, "Mutations rejected by authorization");
    metrics::describe_counter!(QUOTA_REJECTIONS, "Mutations rejected by quota enforcement");
    metrics::describe_counter!(RETENTION_REMOVALS, "Entities removed by the retention sweep");
}
