//! SQLite persistence for messages, activities, threads and store metadata.
//!
//! Every record is kept as a JSON body next to the columns it is indexed
//! by, so the tables behave like an ordered key-value store with secondary
//! indexes on partition and timestamp.

pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::{Result, anyhow};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

pub use models::{EntityKind, MetadataRow};

const READER_POOL_SIZE: usize = 4;
/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Store database with a single writer and a small pool of read-only
/// connections. WAL mode lets readers proceed while a write is in flight.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;
        writer.busy_timeout(BUSY_TIMEOUT)?;
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "synchronous", "NORMAL")?;

        migrations::run(&writer)?;

        let readers = (0..READER_POOL_SIZE)
            .map(|_| open_reader(path).map(Mutex::new))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Collab DB opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| anyhow!("Reader lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| anyhow!("Writer lock poisoned: {}", e))?;
        f(&mut conn)
    }
}

/// Range scans and lookups only; `query_only` turns a stray write on a
/// reader into an error instead of a lock fight with the writer.
fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "query_only", true)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_refuse_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("collab.db")).unwrap();

        let result = db.with_conn(|conn| {
            conn.execute("INSERT INTO metadata (key, value, timestamp) VALUES ('k', '1', 1)", [])?;
            Ok(())
        });
        assert!(result.is_err());

        db.with_conn_mut(|conn| {
            conn.execute("INSERT INTO metadata (key, value, timestamp) VALUES ('k', '1', 1)", [])?;
            Ok(())
        })
        .unwrap();
        assert!(db.get_metadata("k").unwrap().is_some());
    }
}
