//! Database schema management.

use rusqlite::Connection;
use tokio_rusqlite::Error;

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

const SCHEMA: &str = r#"
-- Messages. AUTOINCREMENT keeps ids from being reused after deletes.
CREATE TABLE IF NOT EXISTS queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    channel TEXT NOT NULL,
    job BLOB NOT NULL,
    pushed_at INTEGER NOT NULL,
    ttr INTEGER NOT NULL,
    delay INTEGER NOT NULL DEFAULT 0,
    priority INTEGER NOT NULL DEFAULT 1024,
    reserved_at INTEGER,
    attempt INTEGER NOT NULL DEFAULT 0,
    done_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_queue_channel ON queue(channel);
CREATE INDEX IF NOT EXISTS idx_queue_reserved_at ON queue(reserved_at);
CREATE INDEX IF NOT EXISTS idx_queue_priority ON queue(priority);

-- Named locks with an owner token and a lease expiry
CREATE TABLE IF NOT EXISTS queue_mutex (
    name TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    acquired_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);
"#;
