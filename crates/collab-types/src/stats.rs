use serde::{Deserialize, Serialize};

/// Estimated on-disk weight of one message row.
pub const MESSAGE_BYTES_ESTIMATE: u64 = 1000;
/// Estimated on-disk weight of one activity row.
pub const ACTIVITY_BYTES_ESTIMATE: u64 = 500;

/// Point-in-time storage summary. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// Includes soft-deleted messages.
    pub total_messages: u64,
    pub total_activities: u64,
    /// Count-weighted estimate, not a measured file size.
    pub storage_used: u64,
    pub last_cleanup: Option<i64>,
    pub oldest_message: Option<i64>,
    pub newest_message: Option<i64>,
}

impl StorageStats {
    pub fn estimate_bytes(total_messages: u64, total_activities: u64) -> u64 {
        total_messages * MESSAGE_BYTES_ESTIMATE + total_activities * ACTIVITY_BYTES_ESTIMATE
    }
}

/// Outcome of one compaction pass.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionReport {
    pub messages_deleted: usize,
    pub activities_deleted: usize,
    /// The `lastCleanup` watermark recorded by this pass.
    pub finished_at: i64,
}

impl CompactionReport {
    pub fn is_noop(&self) -> bool {
        self.messages_deleted == 0 && self.activities_deleted == 0
    }
}
