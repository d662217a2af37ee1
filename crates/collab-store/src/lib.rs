//! Local persistent store for collaboration data.
//!
//! [`CollabStore`] is an explicit handle over an indexed SQLite database
//! holding chat messages, activity records and per-partition thread
//! summaries. Writes go through a bounded recency cache and keep the
//! partition's thread in step; a background task keeps the store under
//! its configured record caps.

pub mod backup;
pub mod cache;
pub mod config;
pub mod error;
pub mod locks;
pub mod query;
pub mod retention;
pub mod store;
pub mod threads;

pub use collab_types::{
    ActivityRecord, CompactionReport, ConversationThread, ExportBundle, Message, MessageKind,
    StorageStats,
};
pub use config::{RetentionScope, StoreConfig, ThreadPointerPolicy};
pub use error::{Result, StoreError};
pub use store::CollabStore;
