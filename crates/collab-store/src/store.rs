use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use collab_db::models::LAST_CLEANUP_KEY;
use collab_db::{Database, EntityKind};
use collab_types::{ActivityRecord, Message, StorageStats};

use crate::cache::StoreCaches;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::locks::KeyedLocks;
use crate::retention::RetentionHandle;
use crate::threads::{self, WriteMode};

/// Handle to an open collaboration store.
///
/// Cheap to clone; all clones share one database, one set of caches and
/// one retention task. Construct it once with [`CollabStore::open`] and
/// hand clones to consumers. After [`CollabStore::shutdown`] every
/// operation fails with [`StoreError::NotInitialized`].
#[derive(Clone)]
pub struct CollabStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: StoreConfig,
    db: RwLock<Option<Arc<Database>>>,
    caches: StoreCaches,
    partition_locks: KeyedLocks,
    /// Single slot for compaction passes.
    compaction: tokio::sync::Mutex<()>,
    retention: Mutex<Option<RetentionHandle>>,
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl CollabStore {
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let path = config.db_path.clone();
        let db = tokio::task::spawn_blocking(move || Database::open(&path))
            .await
            .map_err(join_error)??;

        info!(
            path = %config.db_path.display(),
            max_messages = config.max_messages,
            max_activities = config.max_activities,
            "Collab store opened"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                caches: StoreCaches::new(&config),
                config,
                db: RwLock::new(Some(Arc::new(db))),
                partition_locks: KeyedLocks::new(),
                compaction: tokio::sync::Mutex::new(()),
                retention: Mutex::new(None),
            }),
        })
    }

    /// Stop the retention task, wait for a running compaction pass and
    /// release the database. Idempotent.
    pub async fn shutdown(&self) {
        self.stop_retention().await;

        let _slot = self.inner.compaction.lock().await;
        let db = self.inner.db.write().take();
        self.inner.caches.clear();
        if db.is_some() {
            info!("Collab store closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.db.read().is_some()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    // -- Messages --

    /// Upsert a message and update its partition's thread in the same
    /// transaction. Re-storing a known id under a different partition is
    /// rejected with [`StoreError::InvalidRecord`].
    pub async fn store_message(&self, message: Message) -> Result<()> {
        message.validate().map_err(StoreError::InvalidRecord)?;
        let _guard = self.inner.partition_locks.lock(&message.partition_id).await;
        self.write_message(message, WriteMode::Upsert).await
    }

    /// Replace a message's content and mark it edited.
    pub async fn edit_message(&self, id: &str, content: impl Into<String>) -> Result<()> {
        let content = content.into();
        self.mutate_message(id, move |message| {
            if message.deleted {
                return Err(StoreError::message_not_found(&message.id));
            }
            message.content = content;
            message.edited = true;
            message.edited_at = Some(now_ms().max(message.timestamp));
            Ok(true)
        })
        .await
    }

    /// Soft-delete a message. Deleting an already deleted message keeps its
    /// first `deletedAt`.
    pub async fn delete_message(&self, id: &str) -> Result<()> {
        self.mutate_message(id, |message| {
            if message.deleted {
                return Ok(false);
            }
            message.deleted = true;
            message.deleted_at = Some(now_ms().max(message.timestamp));
            Ok(true)
        })
        .await
    }

    /// A stored message by id, soft-deleted ones included.
    pub async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let cached = self.inner.caches.messages.lock().get(id);
        if cached.is_some() {
            return Ok(cached);
        }
        let id = id.to_string();
        self.blocking(move |db| db.get_message(&id)).await
    }

    async fn mutate_message<F>(&self, id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Message) -> Result<bool>,
    {
        let located = self
            .get_message(id)
            .await?
            .ok_or_else(|| StoreError::message_not_found(id))?;
        let _guard = self.inner.partition_locks.lock(&located.partition_id).await;

        // Re-read under the partition lock; the cached copy may predate a
        // concurrent write.
        let lookup = id.to_string();
        let mut message = self
            .blocking(move |db| db.get_message(&lookup))
            .await?
            .ok_or_else(|| StoreError::message_not_found(id))?;

        if !mutate(&mut message)? {
            return Ok(());
        }
        // Compaction does not take partition locks; the write re-checks
        // that the row is still there.
        self.write_message(message, WriteMode::Update).await
    }

    /// Caller must hold the partition lock.
    async fn write_message(&self, message: Message, mode: WriteMode) -> Result<()> {
        let policy = self.inner.config.thread_pointer;
        let msg = message.clone();
        let thread = self
            .blocking(move |db| {
                db.put_message_with_thread(&msg, |current, previous| {
                    threads::admit_write(previous.as_ref(), &msg, mode)
                        .map(|()| threads::fold_message(current, previous.as_ref(), &msg, policy))
                })
            })
            .await??;

        debug!(
            id = %message.id,
            partition = %message.partition_id,
            thread_messages = thread.message_count,
            "Stored message"
        );

        self.inner.caches.messages.lock().insert(message);
        self.inner.caches.threads.lock().insert(thread);
        Ok(())
    }

    // -- Activities --

    pub async fn store_activity(&self, activity: ActivityRecord) -> Result<()> {
        activity.validate().map_err(StoreError::InvalidRecord)?;

        let record = activity.clone();
        self.blocking(move |db| db.put_activity(&record)).await?;

        debug!(id = %activity.id, partition = %activity.partition_id, "Stored activity");
        self.inner.caches.activities.lock().insert(activity);
        Ok(())
    }

    // -- Stats --

    pub async fn get_storage_stats(&self) -> Result<StorageStats> {
        self.blocking(|db| {
            let total_messages = db.count(EntityKind::Message)?;
            let total_activities = db.count(EntityKind::Activity)?;
            let (oldest_message, newest_message) = db.message_time_bounds()?;
            let last_cleanup = db
                .get_metadata(LAST_CLEANUP_KEY)?
                .map(|row| row.value.as_i64().unwrap_or(row.timestamp));

            Ok(StorageStats {
                total_messages,
                total_activities,
                storage_used: StorageStats::estimate_bytes(total_messages, total_activities),
                last_cleanup,
                oldest_message,
                newest_message,
            })
        })
        .await
    }

    // -- Internals shared with the other modules --

    pub(crate) fn caches(&self) -> &StoreCaches {
        &self.inner.caches
    }

    pub(crate) fn partition_locks(&self) -> &KeyedLocks {
        &self.inner.partition_locks
    }

    pub(crate) fn compaction_slot(&self) -> &tokio::sync::Mutex<()> {
        &self.inner.compaction
    }

    pub(crate) fn retention_slot(&self) -> &Mutex<Option<RetentionHandle>> {
        &self.inner.retention
    }

    pub(crate) fn db(&self) -> Result<Arc<Database>> {
        self.inner
            .db
            .read()
            .clone()
            .ok_or(StoreError::NotInitialized)
    }

    /// Run a database closure on the blocking pool.
    pub(crate) async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db()?;
        let result = tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(join_error)?;
        Ok(result?)
    }
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    error!("spawn_blocking join error: {}", e);
    StoreError::StorageUnavailable(anyhow!("blocking task failed: {}", e))
}
