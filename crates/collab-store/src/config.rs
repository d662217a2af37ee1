use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

/// How record caps are applied during compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionScope {
    /// One cap across the whole store, oldest records evicted first
    /// regardless of partition. A busy partition can push out the history
    /// of quiet ones.
    #[default]
    Global,
    /// The cap applies to every partition separately.
    PerPartition,
}

impl FromStr for RetentionScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "global" => Ok(Self::Global),
            "per_partition" => Ok(Self::PerPartition),
            other => bail!("unknown retention scope '{}'", other),
        }
    }
}

/// What "last message" of a thread means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPointerPolicy {
    /// The most recently stored new message, whatever its timestamp.
    #[default]
    LastWrite,
    /// The message with the greatest timestamp seen so far.
    MaxTimestamp,
}

impl FromStr for ThreadPointerPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "last_write" => Ok(Self::LastWrite),
            "max_timestamp" => Ok(Self::MaxTimestamp),
            other => bail!("unknown thread pointer policy '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub message_cache_capacity: usize,
    pub activity_cache_capacity: usize,
    pub thread_cache_capacity: usize,
    pub max_messages: u64,
    pub max_activities: u64,
    pub cleanup_interval_secs: u64,
    pub retention_scope: RetentionScope,
    pub thread_pointer: ThreadPointerPolicy,
    /// Number of most recent messages `search_messages` looks at.
    pub search_window: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("collab.db"),
            message_cache_capacity: 1000,
            activity_cache_capacity: 1000,
            thread_cache_capacity: 1000,
            max_messages: 10_000,
            max_activities: 5_000,
            cleanup_interval_secs: 24 * 60 * 60,
            retention_scope: RetentionScope::Global,
            thread_pointer: ThreadPointerPolicy::LastWrite,
            search_window: 500,
        }
    }
}

impl StoreConfig {
    /// Defaults with the database placed in `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            db_path: dir.join("collab.db"),
            ..Default::default()
        }
    }

    /// Read `COLLAB_*` environment variables over the defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            db_path: lookup("COLLAB_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            message_cache_capacity: parse_var(&lookup, "COLLAB_MESSAGE_CACHE", defaults.message_cache_capacity)?,
            activity_cache_capacity: parse_var(&lookup, "COLLAB_ACTIVITY_CACHE", defaults.activity_cache_capacity)?,
            thread_cache_capacity: parse_var(&lookup, "COLLAB_THREAD_CACHE", defaults.thread_cache_capacity)?,
            max_messages: parse_var(&lookup, "COLLAB_MAX_MESSAGES", defaults.max_messages)?,
            max_activities: parse_var(&lookup, "COLLAB_MAX_ACTIVITIES", defaults.max_activities)?,
            cleanup_interval_secs: parse_var(&lookup, "COLLAB_CLEANUP_INTERVAL_SECS", defaults.cleanup_interval_secs)?,
            retention_scope: parse_var(&lookup, "COLLAB_RETENTION_SCOPE", defaults.retention_scope)?,
            thread_pointer: parse_var(&lookup, "COLLAB_THREAD_POINTER", defaults.thread_pointer)?,
            search_window: parse_var(&lookup, "COLLAB_SEARCH_WINDOW", defaults.search_window)?,
        })
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
