//! Record types shared by the collaboration store crates.
//!
//! These are the values callers hand to and receive from the store. The
//! serialized form uses camelCase field names so backups stay readable by
//! the web front ends that produced the data.

pub mod backup;
pub mod models;
pub mod stats;

pub use backup::ExportBundle;
pub use models::{ActivityRecord, ConversationThread, Message, MessageKind, thread_id_for};
pub use stats::{CompactionReport, StorageStats};

/// Generate a fresh opaque record id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
