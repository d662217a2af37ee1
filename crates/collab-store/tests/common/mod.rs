#![allow(dead_code)]

use collab_store::{ActivityRecord, CollabStore, Message, StoreConfig};
use tempfile::TempDir;

pub async fn open_store(tweak: impl FnOnce(&mut StoreConfig)) -> (TempDir, CollabStore) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StoreConfig::in_dir(dir.path());
    tweak(&mut config);
    let store = CollabStore::open(config).await.unwrap();
    (dir, store)
}

pub fn text(id: &str, partition: &str, sender: &str, ts: i64, content: &str) -> Message {
    Message::text(partition, sender, content, ts).with_id(id)
}

pub fn activity(id: &str, partition: &str, ts: i64) -> ActivityRecord {
    ActivityRecord::new(partition, "u1", "updated", "task", "t1", ts)
        .with_id(id)
        .with_description(format!("u1 updated t1 ({})", id))
}

pub fn ids(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.id.as_str()).collect()
}
