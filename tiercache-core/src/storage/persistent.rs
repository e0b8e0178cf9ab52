//! Persistent storage layer using SQLite
//!
//! The connection is owned by a dedicated worker thread. Every operation is a
//! job sent over a FIFO channel, so all access to one store is strictly serial
//! and applied in submission order. Each job is a single SQL statement, which
//! makes every operation atomic.

use crate::config::StorageSettings;
use crate::error::{CodecError, StoreError, StoreResult};
use crate::monitoring::logging::SLOW_OP_TARGET;
use crate::storage::record::{from_millis, to_millis, StoredRecord};
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cache_entries (
        key TEXT PRIMARY KEY NOT NULL,
        value BLOB NOT NULL,
        checksum INTEGER NOT NULL,
        compressed INTEGER NOT NULL DEFAULT 0,
        expires_at INTEGER,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at
        ON cache_entries(expires_at) WHERE expires_at IS NOT NULL;
";

/// A unit of work for the store worker
struct Job {
    op: &'static str,
    run: Box<dyn FnOnce(&mut Connection) + Send>,
}

/// Result of a submitted operation
pub struct Pending<R> {
    rx: Receiver<StoreResult<R>>,
}

impl<R> Pending<R> {
    /// Block until the worker has executed the operation
    pub fn wait(self) -> StoreResult<R> {
        self.rx.recv().map_err(|_| StoreError::WorkerGone)?
    }
}

/// A live row as read back: the sealed record, or why its columns are unusable
pub type FetchedRecord = Result<StoredRecord, CodecError>;

/// A row as seen by inspection tools, including expired rows
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub key: String,
    pub record: FetchedRecord,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Rows in the table, expired ones included
    pub entries: u64,
    /// Rows past their expiration time
    pub expired_entries: u64,
    /// Sum of stored payload sizes
    pub payload_bytes: u64,
    /// Size of the database file
    pub file_size_bytes: u64,
}

/// SQLite-backed store with a single serial execution context
pub struct PersistentStore {
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
    path: PathBuf,
}

impl PersistentStore {
    /// Open or create the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P, settings: &StorageSettings) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        Self::configure(&conn, settings)?;
        conn.execute_batch(SCHEMA)?;

        let (sender, receiver) = channel::unbounded::<Job>();
        let slow_threshold = Duration::from_millis(settings.slow_op_threshold_ms);
        let thread_name = match path.file_stem() {
            Some(stem) => format!("tiercache-{}", stem.to_string_lossy()),
            None => "tiercache-store".to_string(),
        };

        let worker = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_worker(conn, receiver, slow_threshold))?;
        let worker_id = worker.thread().id();

        debug!(path = %path.display(), "Opened persistent store");

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            worker_id,
            path,
        })
    }

    fn configure(conn: &Connection, settings: &StorageSettings) -> StoreResult<()> {
        conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))?;

        if settings.journal_wal {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            if !mode.eq_ignore_ascii_case("wal") {
                warn!(mode = %mode, "SQLite refused WAL journal mode");
            }
        }

        conn.pragma_update(None, "synchronous", settings.synchronous.as_pragma())?;
        Ok(())
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue an operation on the worker without waiting for it
    pub fn submit<R, F>(&self, op: &'static str, f: F) -> StoreResult<Pending<R>>
    where
        F: FnOnce(&mut Connection) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        // The worker would wait on itself
        if thread::current().id() == self.worker_id {
            return Err(StoreError::Reentrant);
        }

        let sender = self.sender.as_ref().ok_or(StoreError::WorkerGone)?;
        let (tx, rx) = channel::bounded(1);
        let job = Job {
            op,
            run: Box::new(move |conn| {
                let _ = tx.send(f(conn));
            }),
        };

        sender.send(job).map_err(|_| StoreError::WorkerGone)?;
        Ok(Pending { rx })
    }

    /// Run an operation on the worker and wait for its result
    pub fn execute<R, F>(&self, op: &'static str, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Connection) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        self.submit(op, f)?.wait()
    }

    /// Queue an insert-or-replace of a row
    pub fn submit_upsert(&self, key: String, record: StoredRecord) -> StoreResult<Pending<()>> {
        self.submit("upsert", move |conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO cache_entries (key, value, checksum, compressed, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    checksum = excluded.checksum,
                    compressed = excluded.compressed,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at",
            )?;
            stmt.execute(params![
                key,
                record.payload,
                record.checksum,
                record.compressed,
                record.expires_at.map(to_millis),
                to_millis(Utc::now()),
            ])?;
            Ok(())
        })
    }

    /// Insert or replace a row
    pub fn upsert(&self, key: &str, record: StoredRecord) -> StoreResult<()> {
        self.submit_upsert(key.to_string(), record)?.wait()
    }

    /// Queue a read of a live (unexpired) row
    ///
    /// A row whose columns hold values of the wrong type comes back as
    /// `Some(Err(CodecError::Malformed))` rather than failing the operation.
    pub fn submit_fetch(&self, key: String) -> StoreResult<Pending<Option<FetchedRecord>>> {
        self.submit("fetch", move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT value, checksum, compressed, expires_at FROM cache_entries
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
            )?;
            let record = stmt
                .query_row(params![key, to_millis(Utc::now())], read_record)
                .optional()?;
            Ok(record)
        })
    }

    /// Read a live (unexpired) row
    pub fn fetch(&self, key: &str) -> StoreResult<Option<FetchedRecord>> {
        self.submit_fetch(key.to_string())?.wait()
    }

    /// Read a row whether or not it has expired
    pub fn inspect(&self, key: &str) -> StoreResult<Option<StoredRow>> {
        let key = key.to_string();
        self.execute("inspect", move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT value, checksum, compressed, expires_at, updated_at FROM cache_entries
                 WHERE key = ?1",
            )?;
            let row = stmt
                .query_row(params![key], |row| {
                    let record = read_record(row)?;
                    let updated_at: i64 = row.get(4)?;
                    Ok((record, updated_at))
                })
                .optional()?;

            Ok(row.map(|(record, updated_at)| StoredRow {
                key,
                record,
                updated_at: from_millis(updated_at),
            }))
        })
    }

    /// Queue a delete of a row
    pub fn submit_delete(&self, key: String) -> StoreResult<Pending<bool>> {
        self.submit("delete", move |conn| {
            let deleted = conn
                .prepare_cached("DELETE FROM cache_entries WHERE key = ?1")?
                .execute(params![key])?;
            Ok(deleted > 0)
        })
    }

    /// Delete a row, returning whether it existed
    pub fn delete(&self, key: &str) -> StoreResult<bool> {
        self.submit_delete(key.to_string())?.wait()
    }

    /// Delete a row only if it still holds exactly `record`
    pub fn delete_if_unchanged(&self, key: &str, record: &StoredRecord) -> StoreResult<bool> {
        let key = key.to_string();
        let checksum = record.checksum;
        let payload = record.payload.clone();
        self.execute("delete_if_unchanged", move |conn| {
            let deleted = conn
                .prepare_cached(
                    "DELETE FROM cache_entries WHERE key = ?1 AND checksum = ?2 AND value = ?3",
                )?
                .execute(params![key, checksum, payload])?;
            Ok(deleted > 0)
        })
    }

    /// Delete a row only if its columns still fail to read as a record
    ///
    /// Rows written by `upsert` are always well-formed, so a replacement that
    /// raced with the failed read is never removed.
    pub fn delete_if_malformed(&self, key: &str) -> StoreResult<bool> {
        let key = key.to_string();
        self.execute("delete_if_malformed", move |conn| {
            let deleted = conn
                .prepare_cached(
                    "DELETE FROM cache_entries WHERE key = ?1 AND NOT (
                         typeof(value) = 'blob'
                         AND typeof(checksum) = 'integer'
                         AND checksum BETWEEN 0 AND 4294967295
                         AND typeof(compressed) = 'integer'
                         AND typeof(expires_at) IN ('null', 'integer')
                     )",
                )?
                .execute(params![key])?;
            Ok(deleted > 0)
        })
    }

    /// Queue a delete of every row
    pub fn submit_delete_all(&self) -> StoreResult<Pending<usize>> {
        self.submit("delete_all", |conn| {
            Ok(conn.execute("DELETE FROM cache_entries", [])?)
        })
    }

    /// Delete every row, returning how many were removed
    pub fn delete_all(&self) -> StoreResult<usize> {
        self.submit_delete_all()?.wait()
    }

    /// Delete rows whose expiration time has passed
    pub fn delete_expired(&self) -> StoreResult<usize> {
        self.execute("delete_expired", |conn| {
            let deleted = conn
                .prepare_cached(
                    "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                )?
                .execute(params![to_millis(Utc::now())])?;
            Ok(deleted)
        })
    }

    /// List live keys in ascending order
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        self.execute("keys", |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT key FROM cache_entries
                 WHERE expires_at IS NULL OR expires_at > ?1
                 ORDER BY key",
            )?;
            let keys = stmt
                .query_map(params![to_millis(Utc::now())], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }

    /// Get database statistics
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let (entries, expired_entries, payload_bytes) = self.execute("stats", |conn| {
            let counts = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN expires_at IS NOT NULL AND expires_at <= ?1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(LENGTH(value)), 0)
                 FROM cache_entries",
                params![to_millis(Utc::now())],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
            )?;
            Ok(counts)
        })?;

        let file_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);

        Ok(StoreStats {
            entries: entries.max(0) as u64,
            expired_entries: expired_entries.max(0) as u64,
            payload_bytes: payload_bytes.max(0) as u64,
            file_size_bytes,
        })
    }

    /// Checkpoint the journal and rebuild the database file
    pub fn compact(&self) -> StoreResult<()> {
        self.execute("compact", |conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE); VACUUM;")?;
            Ok(())
        })
    }
}

impl Drop for PersistentStore {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain queued jobs and exit
        drop(self.sender.take());

        if let Some(worker) = self.worker.take() {
            if thread::current().id() == self.worker_id {
                return;
            }
            if worker.join().is_err() {
                error!(path = %self.path.display(), "Store worker panicked");
            }
        }
    }
}

/// Read the sealed columns; type mismatches are a property of the row, not a store failure
fn read_record(row: &Row<'_>) -> rusqlite::Result<FetchedRecord> {
    let columns = (row.get_ref(0)?, row.get_ref(1)?, row.get_ref(2)?, row.get_ref(3)?);

    let (payload, checksum, compressed, expires_at) = match columns {
        (
            ValueRef::Blob(payload),
            ValueRef::Integer(checksum),
            ValueRef::Integer(compressed),
            expires_at @ (ValueRef::Null | ValueRef::Integer(_)),
        ) => (payload, checksum, compressed, expires_at),
        (value, checksum, compressed, expires_at) => {
            return Ok(Err(CodecError::Malformed(format!(
                "unexpected column types (value: {}, checksum: {}, compressed: {}, expires_at: {})",
                value.data_type(),
                checksum.data_type(),
                compressed.data_type(),
                expires_at.data_type()
            ))));
        }
    };

    let Ok(checksum) = u32::try_from(checksum) else {
        return Ok(Err(CodecError::Malformed(format!(
            "checksum {} is out of range",
            checksum
        ))));
    };

    Ok(Ok(StoredRecord {
        payload: payload.to_vec(),
        checksum,
        compressed: compressed != 0,
        expires_at: match expires_at {
            ValueRef::Integer(millis) => from_millis(millis),
            _ => None,
        },
    }))
}

/// Main worker loop: execute jobs in arrival order until the channel closes
fn run_worker(mut conn: Connection, receiver: Receiver<Job>, slow_threshold: Duration) {
    debug!("Store worker started");
    let mut processed = 0u64;

    for Job { op, run } in receiver.iter() {
        let started = Instant::now();
        run(&mut conn);
        processed += 1;

        let elapsed = started.elapsed();
        if elapsed >= slow_threshold {
            warn!(
                target: SLOW_OP_TARGET,
                op,
                duration_ms = elapsed.as_millis() as u64,
                "Slow store operation"
            );
        }
    }

    if let Err((_, e)) = conn.close() {
        error!("Failed to close store connection: {}", e);
    }
    debug!(processed, "Store worker stopped");
}
