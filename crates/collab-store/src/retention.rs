//! Record caps and the background compaction task.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use collab_db::models::LAST_CLEANUP_KEY;
use collab_db::{Database, EntityKind};
use collab_types::CompactionReport;

use crate::config::RetentionScope;
use crate::error::{Result, StoreError};
use crate::store::{CollabStore, now_ms};

/// A running retention task and the switch that stops it.
pub struct RetentionHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CollabStore {
    /// Run one compaction pass now: trim messages and activities to their
    /// caps, oldest first, then record the `lastCleanup` watermark.
    ///
    /// Waits if a pass is already running. Re-running against a store that
    /// is already within its caps deletes nothing.
    pub async fn cleanup(&self) -> Result<CompactionReport> {
        let _slot = self.compaction_slot().lock().await;

        let config = self.config();
        let (max_messages, max_activities, scope) =
            (config.max_messages, config.max_activities, config.retention_scope);

        let (messages, activities) = self
            .blocking(move |db| {
                let messages = trim(db, EntityKind::Message, max_messages, scope)?;
                let activities = trim(db, EntityKind::Activity, max_activities, scope)?;
                Ok((messages, activities))
            })
            .await?;

        {
            let mut cache = self.caches().messages.lock();
            for id in &messages {
                cache.remove(id);
            }
        }
        {
            let mut cache = self.caches().activities.lock();
            for id in &activities {
                cache.remove(id);
            }
        }

        let finished_at = now_ms();
        self.blocking(move |db| db.set_metadata(LAST_CLEANUP_KEY, &serde_json::json!(finished_at), finished_at))
            .await?;

        let report = CompactionReport {
            messages_deleted: messages.len(),
            activities_deleted: activities.len(),
            finished_at,
        };
        if report.is_noop() {
            info!("Compaction: store within caps");
        } else {
            info!(
                messages = report.messages_deleted,
                activities = report.activities_deleted,
                "Compaction: pruned oldest records"
            );
        }
        Ok(report)
    }

    /// Start the periodic compaction task. Calling it again while a task is
    /// running does nothing. Must be called from within a Tokio runtime.
    pub fn start_retention(&self) -> Result<()> {
        if !self.is_open() {
            return Err(StoreError::NotInitialized);
        }

        let mut slot = self.retention_slot().lock();
        if slot.as_ref().is_some_and(|h| !h.task.is_finished()) {
            return Ok(());
        }

        let interval = self.config().cleanup_interval();
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(run_cleanup_loop(self.clone(), interval, rx));
        *slot = Some(RetentionHandle { shutdown, task });

        info!(interval_secs = interval.as_secs(), "Retention task started");
        Ok(())
    }

    pub(crate) async fn stop_retention(&self) {
        let handle = self.retention_slot().lock().take();
        if let Some(handle) = handle {
            let _ = handle.shutdown.send(true);
            if let Err(e) = handle.task.await {
                warn!("Retention task ended abnormally: {}", e);
            }
        }
    }
}

fn trim(db: &Database, kind: EntityKind, cap: u64, scope: RetentionScope) -> anyhow::Result<Vec<String>> {
    match scope {
        RetentionScope::Global => db.delete_oldest(kind, cap),
        RetentionScope::PerPartition => db.delete_oldest_per_partition(kind, cap),
    }
}

/// Background loop that runs [`CollabStore::cleanup`] every `interval`.
///
/// The first pass happens one full interval after start. A failed pass is
/// logged and retried at the next tick; the loop only ends on shutdown.
async fn run_cleanup_loop(store: CollabStore, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval_at(Instant::now() + interval, interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = tick.tick() => {
                if let Err(e) = store.cleanup().await {
                    warn!("Compaction error: {}", e);
                }
            }
        }
    }

    info!("Retention task stopped");
}
