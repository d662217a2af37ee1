//! Bounded in-memory maps for recently written records.
//!
//! Eviction is by content timestamp, oldest first, not by access time: the
//! cache holds a window over the newest conversation content. It is never a
//! source of truth and can be cleared at any point.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;

use collab_types::{ActivityRecord, ConversationThread, Message};

use crate::config::StoreConfig;

/// A record that can live in a [`RecencyCache`].
pub trait Recency {
    fn cache_key(&self) -> &str;
    /// Ordering key for eviction. Lower values are evicted first.
    fn recency(&self) -> i64;
}

impl Recency for Message {
    fn cache_key(&self) -> &str {
        &self.id
    }

    fn recency(&self) -> i64 {
        self.timestamp
    }
}

impl Recency for ActivityRecord {
    fn cache_key(&self) -> &str {
        &self.id
    }

    fn recency(&self) -> i64 {
        self.timestamp
    }
}

impl Recency for ConversationThread {
    fn cache_key(&self) -> &str {
        &self.id
    }

    fn recency(&self) -> i64 {
        self.updated_at
    }
}

pub struct RecencyCache<V> {
    capacity: usize,
    entries: HashMap<String, V>,
    order: BTreeSet<(i64, String)>,
}

impl<V: Recency + Clone> RecencyCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: BTreeSet::new(),
        }
    }

    /// Insert or replace an entry, then evict the oldest entries until the
    /// cache is back within capacity. Returns how many were evicted.
    pub fn insert(&mut self, value: V) -> usize {
        let key = value.cache_key().to_string();
        if let Some(previous) = self.entries.remove(&key) {
            self.order.remove(&(previous.recency(), key.clone()));
        }
        self.order.insert((value.recency(), key.clone()));
        self.entries.insert(key, value);

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).cloned()
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let value = self.entries.remove(key)?;
        self.order.remove(&(value.recency(), key.to_string()));
        Some(value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// The three caches a store keeps, one per record family.
pub struct StoreCaches {
    pub messages: Mutex<RecencyCache<Message>>,
    pub activities: Mutex<RecencyCache<ActivityRecord>>,
    pub threads: Mutex<RecencyCache<ConversationThread>>,
}

impl StoreCaches {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            messages: Mutex::new(RecencyCache::new(config.message_cache_capacity)),
            activities: Mutex::new(RecencyCache::new(config.activity_cache_capacity)),
            threads: Mutex::new(RecencyCache::new(config.thread_cache_capacity)),
        }
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
        self.activities.lock().clear();
        self.threads.lock().clear();
    }
}
