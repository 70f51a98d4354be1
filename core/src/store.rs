//! Frame store: key/value writes with expiry.
//!
//! RULE: only the persistence worker writes. It owns the store outright,
//! so no connection is ever shared across threads.

use crate::error::{HarnessError, HarnessResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::time::Duration;

/// The key/value contract the worker consumes.
pub trait FrameStore: Send {
    fn set_bytes(&mut self, key: &str, value: &[u8], ttl: Duration) -> HarnessResult<()>;

    fn set_string(&mut self, key: &str, value: &str, ttl: Duration) -> HarnessResult<()>;

    /// `None` when the key is absent or expired.
    fn get_bytes(&self, key: &str) -> HarnessResult<Option<Vec<u8>>>;

    fn get_string(&self, key: &str) -> HarnessResult<Option<String>> {
        match self.get_bytes(key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| HarnessError::InvalidUtf8 { key: key.to_string() }),
            None => Ok(None),
        }
    }

    /// Drop expired keys. Stores with native expiry leave this as a no-op.
    fn purge_expired(&mut self) -> HarnessResult<usize> {
        Ok(0)
    }
}

/// SQLite-backed store. Expiry is wall-clock milliseconds.
pub struct SqliteFrameStore {
    conn: Connection,
}

impl SqliteFrameStore {
    /// Open (or create) the store database at `path` and apply the schema.
    pub fn open(path: &str) -> HarnessResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL only matters for real files; memory databases ignore it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (used in tests).
    pub fn in_memory() -> HarnessResult<Self> {
        let store = Self { conn: Connection::open_in_memory()? };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> HarnessResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_frame_store.sql"))?;
        Ok(())
    }

    fn upsert(&self, key: &str, value: &[u8], ttl: Duration) -> HarnessResult<()> {
        let expires_at = now_ms().saturating_add(ttl.as_millis() as i64);
        self.conn.execute(
            "INSERT INTO frame_kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    /// Live keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> HarnessResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT key FROM frame_kv
             WHERE substr(key, 1, length(?1)) = ?1 AND expires_at > ?2
             ORDER BY key ASC",
        )?;
        let keys = stmt
            .query_map(params![prefix, now_ms()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}

impl FrameStore for SqliteFrameStore {
    fn set_bytes(&mut self, key: &str, value: &[u8], ttl: Duration) -> HarnessResult<()> {
        self.upsert(key, value, ttl)
    }

    fn set_string(&mut self, key: &str, value: &str, ttl: Duration) -> HarnessResult<()> {
        self.upsert(key, value.as_bytes(), ttl)
    }

    fn get_bytes(&self, key: &str) -> HarnessResult<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM frame_kv WHERE key = ?1 AND expires_at > ?2",
                params![key, now_ms()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn purge_expired(&mut self) -> HarnessResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM frame_kv WHERE expires_at <= ?1", params![now_ms()])?;
        Ok(removed)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
