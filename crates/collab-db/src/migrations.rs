use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const SCHEMA_VERSION: i64 = 1;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Collab DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                partition_id    TEXT NOT NULL,
                sender_id       TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                deleted         INTEGER NOT NULL DEFAULT 0,
                body            TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_partition
                ON messages(partition_id);
            CREATE INDEX IF NOT EXISTS idx_messages_created
                ON messages(created_at, id);
            CREATE INDEX IF NOT EXISTS idx_messages_sender
                ON messages(sender_id);
            CREATE INDEX IF NOT EXISTS idx_messages_partition_created
                ON messages(partition_id, created_at, id);

            CREATE TABLE IF NOT EXISTS activities (
                id              TEXT PRIMARY KEY,
                partition_id    TEXT NOT NULL,
                actor_id        TEXT NOT NULL,
                target_kind     TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                body            TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_activities_partition
                ON activities(partition_id);
            CREATE INDEX IF NOT EXISTS idx_activities_created
                ON activities(created_at, id);
            CREATE INDEX IF NOT EXISTS idx_activities_actor
                ON activities(actor_id);
            CREATE INDEX IF NOT EXISTS idx_activities_target
                ON activities(target_kind);
            CREATE INDEX IF NOT EXISTS idx_activities_partition_created
                ON activities(partition_id, created_at, id);

            CREATE TABLE IF NOT EXISTS threads (
                id              TEXT PRIMARY KEY,
                partition_id    TEXT NOT NULL,
                updated_at      INTEGER NOT NULL,
                body            TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_threads_partition
                ON threads(partition_id);
            CREATE INDEX IF NOT EXISTS idx_threads_updated
                ON threads(updated_at);

            CREATE TABLE IF NOT EXISTS metadata (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL,
                timestamp       INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
