//! Per-partition conversation summaries.

use tracing::debug;

use collab_types::{ConversationThread, Message, thread_id_for};

use crate::config::ThreadPointerPolicy;
use crate::error::{Result, StoreError};
use crate::store::CollabStore;

/// How a message write relates to what is already stored under its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// Insert, or replace a record of the same partition.
    Upsert,
    /// Rewrite of a record that must still exist (edit, soft delete).
    Update,
}

/// Decide inside the write transaction whether `msg` may replace
/// `previous`. A message never moves between partitions, and an update
/// never resurrects a record that compaction removed.
pub(crate) fn admit_write(previous: Option<&Message>, msg: &Message, mode: WriteMode) -> Result<()> {
    match previous {
        None if mode == WriteMode::Update => Err(StoreError::message_not_found(&msg.id)),
        Some(stored) if stored.partition_id != msg.partition_id => Err(StoreError::InvalidRecord(format!(
            "message {} belongs to partition {}, not {}",
            msg.id, stored.partition_id, msg.partition_id
        ))),
        _ => Ok(()),
    }
}

/// Fold one message write into its partition's thread.
///
/// `previous` is the version of this message that was already stored, if
/// any, and has passed [`admit_write`]. Re-storing a known id (edit, soft
/// delete, re-import) never counts as a new message.
pub fn fold_message(
    current: Option<ConversationThread>,
    previous: Option<&Message>,
    msg: &Message,
    policy: ThreadPointerPolicy,
) -> ConversationThread {
    let Some(mut thread) = current else {
        return ConversationThread::started_by(msg);
    };

    thread.add_participant(&msg.sender_id);

    if previous.is_none() {
        thread.message_count += 1;

        let advance = match policy {
            ThreadPointerPolicy::LastWrite => true,
            ThreadPointerPolicy::MaxTimestamp => msg.timestamp >= thread.last_message_timestamp,
        };
        if advance {
            thread.last_message_id = msg.id.clone();
            thread.last_message_timestamp = msg.timestamp;
        }

        for participant in &thread.participants {
            if participant != &msg.sender_id {
                *thread.unread_count.entry(participant.clone()).or_insert(0) += 1;
            }
        }
        thread.updated_at = thread.updated_at.max(msg.timestamp);
    } else if thread.last_message_id == msg.id {
        thread.last_message_timestamp = msg.timestamp;
    }

    thread
}

impl CollabStore {
    /// The thread for a partition, served from the thread cache when present.
    pub async fn get_thread(&self, partition_id: &str) -> Result<Option<ConversationThread>> {
        let thread_id = thread_id_for(partition_id);
        let cached = self.caches().threads.lock().get(&thread_id);
        if cached.is_some() {
            return Ok(cached);
        }

        let thread = self
            .blocking(move |db| db.get_thread(&thread_id))
            .await?;
        if let Some(thread) = &thread {
            self.caches().threads.lock().insert(thread.clone());
        }
        Ok(thread)
    }

    /// Threads ordered by their last update, most recent first.
    pub async fn list_threads(&self, limit: u32) -> Result<Vec<ConversationThread>> {
        self.blocking(move |db| db.list_threads(limit)).await
    }

    /// Reset a user's unread counter for a partition.
    ///
    /// With `before`, messages from other senders at or after that
    /// timestamp stay unread and the counter is set to their number.
    pub async fn mark_messages_as_read(
        &self,
        partition_id: &str,
        user_id: &str,
        before: Option<i64>,
    ) -> Result<()> {
        let _guard = self.partition_locks().lock(partition_id).await;

        let Some(mut thread) = self.get_thread(partition_id).await? else {
            return Ok(());
        };

        let remaining = match before {
            None => 0,
            Some(since) => {
                let partition = partition_id.to_string();
                let user = user_id.to_string();
                self.blocking(move |db| db.count_messages_since(&partition, &user, since))
                    .await?
            }
        };

        thread.unread_count.insert(user_id.to_string(), remaining);
        let stored = thread.clone();
        self.blocking(move |db| db.put_thread(&stored)).await?;
        self.caches().threads.lock().insert(thread);

        debug!(partition = %partition_id, user = %user_id, remaining, "Marked messages as read");
        Ok(())
    }

    pub async fn get_unread_count(&self, partition_id: &str, user_id: &str) -> Result<u64> {
        Ok(self
            .get_thread(partition_id)
            .await?
            .map(|t| t.unread_for(user_id))
            .unwrap_or(0))
    }
}
