//! Row-level types for the store tables. Record bodies themselves are the
//! collab-types models serialized as JSON.

/// The two record families that share the capped, compacted lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Message,
    Activity,
}

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Message => "messages",
            Self::Activity => "activities",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// One entry of the metadata table. `value` is JSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub key: String,
    pub value: serde_json::Value,
    pub timestamp: i64,
}

/// Metadata key holding the time of the last completed compaction pass.
pub const LAST_CLEANUP_KEY: &str = "lastCleanup";
