//! SQLite persistence layer.
//!
//! RULE: Only the store module talks to the database.
//! Engine components go through the `RequestStore`, `ReferenceSource`
//! and `RunLog` traits; they never execute SQL directly.

mod reference;
mod requests;

pub use requests::{RequestChange, RequestPatch};

use crate::{
    error::{SimError, SimResult},
    event::EventLogEntry,
    model::{CategoryRoute, Provenance, RequestStatus, ServicePoint, ServiceRequest, TypeConfig},
    types::Timestamp,
};
use chrono::DateTime;
use rusqlite::{params, Connection};
use std::{cell::RefCell, sync::mpsc};

// ── Collaborator contracts ──────────────────────────────────────────

/// Request table access: the only shared mutable resource of a run.
pub trait RequestStore {
    /// Insert in batches of `batch_size`. All-or-nothing: a failing batch
    /// leaves no earlier batch behind. Returns the number inserted.
    fn insert_requests(&self, requests: &[ServiceRequest], batch_size: usize) -> SimResult<usize>;

    /// Requests with the given provenance, optionally filtered by status,
    /// in arrival order.
    fn select_requests(
        &self,
        provenance: Provenance,
        status: Option<RequestStatus>,
    ) -> SimResult<Vec<ServiceRequest>>;

    /// Apply a partial update to one request. Unknown ids are an error.
    fn update_request(&self, request_id: &str, patch: &RequestPatch) -> SimResult<()>;

    /// Delete every request with the given provenance. Returns the count.
    fn delete_requests(&self, provenance: Provenance) -> SimResult<usize>;

    fn count_requests(
        &self,
        provenance: Provenance,
        status: Option<RequestStatus>,
    ) -> SimResult<usize>;
}

/// Read-only reference data consulted by the generator and processor.
pub trait ReferenceSource {
    fn queue_types(&self) -> SimResult<Vec<TypeConfig>>;
    /// Service points in configured order.
    fn service_points(&self) -> SimResult<Vec<ServicePoint>>;
    fn routing(&self) -> SimResult<Vec<CategoryRoute>>;
}

/// Run registry and event log.
pub trait RunLog {
    fn insert_run(&self, run_id: &str, seed: u64, version: &str) -> SimResult<()>;
    fn append_event(&self, entry: &EventLogEntry) -> SimResult<()>;
}

/// Everything the run controller needs from its store.
pub trait QueueStore: RequestStore + ReferenceSource + RunLog {}

impl<T: RequestStore + ReferenceSource + RunLog> QueueStore for T {}

// ── SQLite implementation ───────────────────────────────────────────

pub struct SimStore {
    conn: Connection,
    change_feed: RefCell<Vec<mpsc::Sender<RequestChange>>>,
}

impl SimStore {
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            change_feed: RefCell::new(Vec::new()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            change_feed: RefCell::new(Vec::new()),
        })
    }

    /// Apply all schema migrations in order. Safe to call repeatedly.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_reference.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_service_request.sql"))?;
        Ok(())
    }

    /// Realtime change notifications for the request table.
    /// Consumed by surrounding UI, never by the engine itself.
    pub fn subscribe_changes(&self) -> mpsc::Receiver<RequestChange> {
        let (tx, rx) = mpsc::channel();
        self.change_feed.borrow_mut().push(tx);
        rx
    }

    fn notify(&self, change: RequestChange) {
        self.change_feed
            .borrow_mut()
            .retain(|tx| tx.send(change.clone()).is_ok());
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn events_for_run(&self, run_id: &str) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, step, source, event_type, payload
             FROM event_log WHERE run_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    run_id: row.get(1)?,
                    step: row.get::<_, i64>(2)? as u64,
                    source: row.get(3)?,
                    event_type: row.get(4)?,
                    payload: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn run_count(&self) -> SimResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM run", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl RunLog for SimStore {
    fn insert_run(&self, run_id: &str, seed: u64, version: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, seed as i64, version, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn append_event(&self, entry: &EventLogEntry) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, step, source, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.run_id,
                entry.step as i64,
                entry.source,
                entry.event_type,
                entry.payload,
                chrono::Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }
}

// ── Timestamp encoding ──────────────────────────────────────────────

pub(crate) fn encode_ts(ts: Timestamp) -> i64 {
    ts.and_utc().timestamp()
}

pub(crate) fn decode_ts(secs: i64) -> SimResult<Timestamp> {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| SimError::UnexpectedShape(format!("timestamp {secs} out of range")))
}
