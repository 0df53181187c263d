//! SQLite message store implementation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{OptionalExtension, Row, params};
use tokio_rusqlite::Connection;
use tracing::debug;

use dbqueue_core::{Message, MessageId, MessageStore, NewMessage, QueueError, QueueStats};

use crate::mutex::SqliteMutex;
use crate::schema::init_schema;

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const COLUMNS: &str =
    "id, channel, job, pushed_at, ttr, delay, priority, reserved_at, done_at, attempt";

pub(crate) fn store_error(e: tokio_rusqlite::Error) -> QueueError {
    QueueError::Store(e.to_string())
}

/// Seconds as an INTEGER column value.
fn seconds_column(name: &str, secs: u64) -> Result<i64, QueueError> {
    i64::try_from(secs).map_err(|_| {
        QueueError::InvalidOption(format!("{} of {}s does not fit the store", name, secs))
    })
}

/// Payload bytes, whether the column was written as BLOB or as TEXT.
fn payload(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<u8>> {
    match row.get_ref(idx)? {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Ok(bytes.to_vec()),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "job".to_string(),
            other.data_type(),
        )),
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId(row.get(0)?),
        channel: row.get(1)?,
        payload: payload(row, 2)?,
        pushed_at: row.get(3)?,
        ttr: row.get::<_, i64>(4)? as u64,
        delay: row.get::<_, i64>(5)? as u64,
        priority: row.get(6)?,
        reserved_at: row.get(7)?,
        done_at: row.get(8)?,
        attempt: row.get::<_, i64>(9)? as u32,
    })
}

/// SQLite-backed message store.
pub struct SqliteMessageStore {
    conn: Connection,
}

impl SqliteMessageStore {
    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory().await.map_err(store_error)?;

        conn.call(|conn| Ok(init_schema(conn)?))
            .await
            .map_err(store_error)?;

        Ok(Self { conn })
    }

    /// Open or create a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| QueueError::Store(e.to_string()))?;
        }

        let conn = Connection::open(&path).await.map_err(store_error)?;

        conn.call(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            Ok(init_schema(conn)?)
        })
        .await
        .map_err(store_error)?;

        debug!("Opened SQLite queue at {}", path.display());
        Ok(Self { conn })
    }

    /// A lock over the same database.
    pub fn mutex(&self, lease: Duration) -> SqliteMutex {
        SqliteMutex::new(self.conn.clone(), lease)
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert(&self, message: NewMessage) -> Result<MessageId, QueueError> {
        let ttr = seconds_column("ttr", message.ttr)?;
        let delay = seconds_column("delay", message.delay)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO queue (channel, job, pushed_at, ttr, delay, priority)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        message.channel,
                        message.payload,
                        message.pushed_at,
                        ttr,
                        delay,
                        message.priority
                    ],
                )?;
                Ok(MessageId(conn.last_insert_rowid()))
            })
            .await
            .map_err(store_error)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, QueueError> {
        self.conn
            .call(move |conn| {
                let sql = format!("SELECT {} FROM queue WHERE id = ?1", COLUMNS);
                Ok(conn
                    .query_row(&sql, [id.0], row_to_message)
                    .optional()?)
            })
            .await
            .map_err(store_error)
    }

    async fn update_reservation(
        &self,
        id: MessageId,
        reserved_at: i64,
        attempt: u32,
    ) -> Result<(), QueueError> {
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE queue SET reserved_at = ?1, attempt = ?2 WHERE id = ?3",
                    params![reserved_at, attempt as i64, id.0],
                )?)
            })
            .await
            .map_err(store_error)?;

        if changed == 0 {
            return Err(QueueError::Store(format!("message {} not found", id)));
        }
        Ok(())
    }

    async fn mark_done(&self, id: MessageId, done_at: i64) -> Result<(), QueueError> {
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE queue SET done_at = ?1 WHERE id = ?2",
                    params![done_at, id.0],
                )?)
            })
            .await
            .map_err(store_error)?;

        if changed == 0 {
            return Err(QueueError::Store(format!("message {} not found", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> Result<bool, QueueError> {
        self.conn
            .call(move |conn| Ok(conn.execute("DELETE FROM queue WHERE id = ?1", [id.0])? > 0))
            .await
            .map_err(store_error)
    }

    async fn unreserve_expired(&self, now: i64) -> Result<u64, QueueError> {
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE queue SET reserved_at = NULL
                     WHERE reserved_at < ?1 - ttr AND done_at IS NULL",
                    [now],
                )?;
                Ok(changed as u64)
            })
            .await
            .map_err(store_error)
    }

    async fn select_next_eligible(
        &self,
        channel: &str,
        now: i64,
    ) -> Result<Option<Message>, QueueError> {
        let channel = channel.to_string();
        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {} FROM queue
                     WHERE channel = ?1 AND reserved_at IS NULL AND done_at IS NULL
                       AND pushed_at <= ?2 - delay
                     ORDER BY priority ASC, id ASC
                     LIMIT 1",
                    COLUMNS
                );
                Ok(conn
                    .query_row(&sql, params![channel, now], row_to_message)
                    .optional()?)
            })
            .await
            .map_err(store_error)
    }

    async fn last_issued_id(&self) -> Result<Option<MessageId>, QueueError> {
        self.conn
            .call(|conn| {
                let seq: Option<i64> = conn
                    .query_row(
                        "SELECT seq FROM sqlite_sequence WHERE name = 'queue'",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(seq.filter(|seq| *seq > 0).map(MessageId))
            })
            .await
            .map_err(store_error)
    }

    async fn clear(&self, channel: &str) -> Result<u64, QueueError> {
        let channel = channel.to_string();
        self.conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM queue WHERE channel = ?1", [channel])?;
                Ok(changed as u64)
            })
            .await
            .map_err(store_error)
    }

    async fn stats(&self, channel: &str, now: i64) -> Result<QueueStats, QueueError> {
        let channel = channel.to_string();
        self.conn
            .call(move |conn| {
                let stats = conn.query_row(
                    "SELECT
                        COALESCE(SUM(done_at IS NULL AND reserved_at IS NULL AND pushed_at <= ?2 - delay), 0),
                        COALESCE(SUM(done_at IS NULL AND reserved_at IS NULL AND pushed_at > ?2 - delay), 0),
                        COALESCE(SUM(done_at IS NULL AND reserved_at IS NOT NULL), 0),
                        COALESCE(SUM(done_at IS NOT NULL), 0)
                     FROM queue WHERE channel = ?1",
                    params![channel, now],
                    |row| {
                        Ok(QueueStats {
                            waiting: row.get::<_, i64>(0)? as u64,
                            delayed: row.get::<_, i64>(1)? as u64,
                            reserved: row.get::<_, i64>(2)? as u64,
                            done: row.get::<_, i64>(3)? as u64,
                        })
                    },
                )?;
                Ok(stats)
            })
            .await
            .map_err(store_error)
    }
}
