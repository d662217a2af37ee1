use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use collab_types::{ActivityRecord, ConversationThread, Message};

use crate::Database;
use crate::models::{EntityKind, MetadataRow};

impl Database {
    // -- Messages --

    /// Upsert a message and fold it into its partition's thread in one
    /// transaction. `aggregate` receives the stored thread (if any) and the
    /// previously stored version of this message (if any) and returns the
    /// thread to persist. When it returns `Err`, nothing is written and the
    /// rejection is handed back as the inner result.
    pub fn put_message_with_thread<F, E>(
        &self,
        msg: &Message,
        aggregate: F,
    ) -> Result<std::result::Result<ConversationThread, E>>
    where
        F: FnOnce(Option<ConversationThread>, Option<Message>) -> std::result::Result<ConversationThread, E>,
    {
        let thread_id = collab_types::thread_id_for(&msg.partition_id);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let previous = query_message(&tx, &msg.id)?;
            let current = query_thread(&tx, &thread_id)?;
            let thread = match aggregate(current, previous) {
                Ok(thread) => thread,
                Err(rejected) => return Ok(Err(rejected)),
            };

            upsert_message(&tx, msg)?;
            upsert_thread(&tx, &thread)?;
            tx.commit()?;

            Ok(Ok(thread))
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<Message>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Visible messages of a partition, newest first. `before` excludes
    /// messages at or after that timestamp.
    pub fn get_messages(
        &self,
        partition_id: &str,
        limit: u32,
        offset: u32,
        before: Option<i64>,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT body FROM messages
                 WHERE partition_id = ?1
                   AND deleted = 0
                   AND (?2 IS NULL OR created_at < ?2)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3 OFFSET ?4",
            )?;
            let bodies = stmt
                .query_map(params![partition_id, before, limit, offset], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            decode_all(bodies)
        })
    }

    /// Every stored message, soft-deleted included, oldest first. Restricted
    /// to one partition when `partition_id` is given.
    pub fn dump_messages(&self, partition_id: Option<&str>) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM messages
                 WHERE (?1 IS NULL OR partition_id = ?1)
                 ORDER BY created_at ASC, id ASC",
            )?;
            let bodies = stmt
                .query_map([partition_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            decode_all(bodies)
        })
    }

    /// Visible messages from senders other than `user_id` at or after `since`.
    pub fn count_messages_since(&self, partition_id: &str, user_id: &str, since: i64) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE partition_id = ?1 AND deleted = 0 AND sender_id != ?2 AND created_at >= ?3",
                params![partition_id, user_id, since],
                |r| r.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Oldest and newest message timestamps, soft-deleted included.
    pub fn message_time_bounds(&self) -> Result<(Option<i64>, Option<i64>)> {
        self.with_conn(|conn| {
            let bounds = conn.query_row(
                "SELECT MIN(created_at), MAX(created_at) FROM messages",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            Ok(bounds)
        })
    }

    // -- Activities --

    pub fn put_activity(&self, activity: &ActivityRecord) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO activities (id, partition_id, actor_id, target_kind, created_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    partition_id = excluded.partition_id,
                    actor_id = excluded.actor_id,
                    target_kind = excluded.target_kind,
                    created_at = excluded.created_at,
                    body = excluded.body",
                params![
                    activity.id,
                    activity.partition_id,
                    activity.actor_id,
                    activity.target_kind,
                    activity.timestamp,
                    encode(activity)?,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_activities(&self, partition_id: &str, limit: u32, offset: u32) -> Result<Vec<ActivityRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT body FROM activities
                 WHERE partition_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let bodies = stmt
                .query_map(params![partition_id, limit, offset], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            decode_all(bodies)
        })
    }

    pub fn dump_activities(&self, partition_id: Option<&str>) -> Result<Vec<ActivityRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM activities
                 WHERE (?1 IS NULL OR partition_id = ?1)
                 ORDER BY created_at ASC, id ASC",
            )?;
            let bodies = stmt
                .query_map([partition_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            decode_all(bodies)
        })
    }

    // -- Threads --

    pub fn get_thread(&self, thread_id: &str) -> Result<Option<ConversationThread>> {
        self.with_conn(|conn| query_thread(conn, thread_id))
    }

    pub fn put_thread(&self, thread: &ConversationThread) -> Result<()> {
        self.with_conn_mut(|conn| upsert_thread(conn, thread))
    }

    /// Threads ordered by last update, most recent first.
    pub fn list_threads(&self, limit: u32) -> Result<Vec<ConversationThread>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM threads ORDER BY updated_at DESC, id ASC LIMIT ?1",
            )?;
            let bodies = stmt
                .query_map([limit], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            decode_all(bodies)
        })
    }

    // -- Counting & compaction --

    /// Total stored records of a kind, soft-deleted messages included.
    pub fn count(&self, kind: EntityKind) -> Result<u64> {
        self.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
            let count: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
            Ok(count as u64)
        })
    }

    /// Delete all but the newest `keep` records of a kind, ordered by global
    /// timestamp. Returns the ids that were removed.
    pub fn delete_oldest(&self, kind: EntityKind, keep: u64) -> Result<Vec<String>> {
        let table = kind.table();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let total: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
            let excess = (total as u64).saturating_sub(keep);
            if excess == 0 {
                return Ok(Vec::new());
            }

            let ids = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT id FROM {} ORDER BY created_at ASC, id ASC LIMIT ?1",
                    table
                ))?;
                let ids = stmt
                    .query_map([sql_limit(excess)], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };
            delete_ids(&tx, table, &ids)?;
            tx.commit()?;

            debug!(table, deleted = ids.len(), keep, "Deleted oldest records");
            Ok(ids)
        })
    }

    /// Like [`Database::delete_oldest`] but keeps the newest `keep` records
    /// of every partition independently.
    pub fn delete_oldest_per_partition(&self, kind: EntityKind, keep: u64) -> Result<Vec<String>> {
        let table = kind.table();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let ids = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT id FROM (
                        SELECT id, ROW_NUMBER() OVER (
                            PARTITION BY partition_id ORDER BY created_at DESC, id DESC
                        ) AS rn
                        FROM {}
                     ) WHERE rn > ?1",
                    table
                ))?;
                let ids = stmt
                    .query_map([sql_limit(keep)], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };
            delete_ids(&tx, table, &ids)?;
            tx.commit()?;

            debug!(table, deleted = ids.len(), keep, "Deleted oldest records per partition");
            Ok(ids)
        })
    }

    // -- Metadata --

    pub fn set_metadata(&self, key: &str, value: &serde_json::Value, timestamp: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO metadata (key, value, timestamp) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, timestamp = excluded.timestamp",
                params![key, value.to_string(), timestamp],
            )?;
            Ok(())
        })
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<MetadataRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT key, value, timestamp FROM metadata WHERE key = ?1",
                    [key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
                )
                .optional()?;

            row.map(|(key, value, timestamp)| -> Result<MetadataRow> {
                let value = serde_json::from_str(&value)
                    .with_context(|| format!("Corrupt metadata value for '{}'", key))?;
                Ok(MetadataRow { key, value, timestamp })
            })
            .transpose()
        })
    }
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<Message>> {
    let body: Option<String> = conn
        .query_row("SELECT body FROM messages WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    body.map(|b| decode(&b)).transpose()
}

fn query_thread(conn: &Connection, id: &str) -> Result<Option<ConversationThread>> {
    let body: Option<String> = conn
        .query_row("SELECT body FROM threads WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    body.map(|b| decode(&b)).transpose()
}

fn upsert_message(conn: &Connection, msg: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, partition_id, sender_id, created_at, deleted, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            partition_id = excluded.partition_id,
            sender_id = excluded.sender_id,
            created_at = excluded.created_at,
            deleted = excluded.deleted,
            body = excluded.body",
        params![
            msg.id,
            msg.partition_id,
            msg.sender_id,
            msg.timestamp,
            msg.deleted,
            encode(msg)?,
        ],
    )?;
    Ok(())
}

fn upsert_thread(conn: &Connection, thread: &ConversationThread) -> Result<()> {
    conn.execute(
        "INSERT INTO threads (id, partition_id, updated_at, body) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            partition_id = excluded.partition_id,
            updated_at = excluded.updated_at,
            body = excluded.body",
        params![thread.id, thread.partition_id, thread.updated_at, encode(thread)?],
    )?;
    Ok(())
}

fn delete_ids(conn: &Connection, table: &str, ids: &[String]) -> Result<()> {
    let mut stmt = conn.prepare(&format!("DELETE FROM {} WHERE id = ?1", table))?;
    for id in ids {
        stmt.execute([id])?;
    }
    Ok(())
}

/// SQLite integers are signed; anything past `i64::MAX` means "no limit".
fn sql_limit(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to encode record body")
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).context("Corrupt record body")
}

fn decode_all<T: DeserializeOwned>(bodies: Vec<String>) -> Result<Vec<T>> {
    bodies.iter().map(|b| decode(b)).collect()
}
