//! Conversation-oriented reads. Ranges always come from the database,
//! which owns ordering and soft-delete filtering; the cache is not used.

use collab_types::{ActivityRecord, Message};

use crate::error::Result;
use crate::store::CollabStore;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

impl CollabStore {
    /// Visible messages of a partition, newest first.
    ///
    /// `before` turns the call into a "load older" page: only messages with
    /// a timestamp strictly below it are considered. `offset` skips that
    /// many visible messages.
    pub async fn get_project_messages(
        &self,
        partition_id: &str,
        limit: u32,
        offset: u32,
        before: Option<i64>,
    ) -> Result<Vec<Message>> {
        let partition = partition_id.to_string();
        let mut messages = self
            .blocking(move |db| db.get_messages(&partition, limit, offset, before))
            .await?;
        messages.retain(|m| !m.deleted);
        Ok(messages)
    }

    pub async fn get_project_activities(
        &self,
        partition_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ActivityRecord>> {
        let partition = partition_id.to_string();
        self.blocking(move |db| db.get_activities(&partition, limit, offset))
            .await
    }

    /// Case-insensitive substring search over content and sender name.
    ///
    /// Only the most recent `search_window` messages of the partition are
    /// examined; older history is not searched. Results keep recency order.
    pub async fn search_messages(&self, partition_id: &str, query: &str, limit: usize) -> Result<Vec<Message>> {
        let window = self.config().search_window;
        let recent = self.get_project_messages(partition_id, window, 0, None).await?;

        let needle = query.to_lowercase();
        Ok(recent
            .into_iter()
            .filter(|m| m.matches_lowercase(&needle))
            .take(limit)
            .collect())
    }
}
