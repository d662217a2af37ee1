//! Bulk export and import.

use std::collections::HashMap;

use tracing::info;

use collab_types::ExportBundle;

use crate::error::{Result, StoreError};
use crate::store::CollabStore;

impl CollabStore {
    /// Export stored records, oldest first, straight from the database.
    ///
    /// Soft-deleted messages are included with their markers so a restore
    /// reproduces the store. Without a partition the whole store is
    /// exported.
    pub async fn export_data(&self, partition_id: Option<&str>) -> Result<ExportBundle> {
        let partition = partition_id.map(str::to_owned);
        let bundle = self
            .blocking(move |db| {
                Ok(ExportBundle {
                    messages: db.dump_messages(partition.as_deref())?,
                    activities: db.dump_activities(partition.as_deref())?,
                })
            })
            .await?;

        info!(
            partition = partition_id.unwrap_or("*"),
            messages = bundle.messages.len(),
            activities = bundle.activities.len(),
            "Exported data"
        );
        Ok(bundle)
    }

    /// Re-insert every record through the normal write path, in bundle
    /// order, so caches and threads stay consistent.
    ///
    /// The whole bundle is validated before anything is written, including
    /// that no id appears under two partitions. A storage failure, or a
    /// record whose id is already stored under another partition, aborts
    /// the import at that record; records written before it stay written.
    pub async fn import_data(&self, bundle: ExportBundle) -> Result<()> {
        let mut partitions: HashMap<&str, &str> = HashMap::new();
        for (idx, message) in bundle.messages.iter().enumerate() {
            message
                .validate()
                .map_err(|e| StoreError::InvalidRecord(format!("messages[{}]: {}", idx, e)))?;
            let partition = partitions
                .entry(message.id.as_str())
                .or_insert(message.partition_id.as_str());
            if *partition != message.partition_id {
                return Err(StoreError::InvalidRecord(format!(
                    "messages[{}]: id {} already used in partition {}",
                    idx, message.id, partition
                )));
            }
        }
        for (idx, activity) in bundle.activities.iter().enumerate() {
            activity
                .validate()
                .map_err(|e| StoreError::InvalidRecord(format!("activities[{}]: {}", idx, e)))?;
        }

        let (message_count, activity_count) = (bundle.messages.len(), bundle.activities.len());
        for message in bundle.messages {
            self.store_message(message).await?;
        }
        for activity in bundle.activities {
            self.store_activity(activity).await?;
        }

        info!(messages = message_count, activities = activity_count, "Imported data");
        Ok(())
    }
}
