use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::tasks::{decode_payload, encode_payload, format_exec_at, parse_exec_at, ScheduledTask, TaskStatus};
use crate::error::{Error, Result};

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS scheduler (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT,
        payload TEXT,
        exec_at DATETIME,
        status TEXT DEFAULT 'pending'
    );
    CREATE TABLE IF NOT EXISTS kv_store (
        key TEXT PRIMARY KEY,
        value TEXT
    );
";

/// Persistence for scheduled tasks.
pub trait TaskStore: Send + Sync {
    /// Insert a pending task and return its id.
    fn add_task(&self, task_type: &str, payload: &Value, execute_at: NaiveDateTime) -> Result<i64>;

    /// Pending tasks with `execute_at <= now`, oldest first.
    fn due_tasks(&self, now: NaiveDateTime) -> Result<Vec<ScheduledTask>>;

    fn mark_done(&self, id: i64) -> Result<()>;
}

/// SQLite-backed store. Shares one connection behind a mutex.
///
/// Rows that fail to decode stay in the table untouched; their ids are
/// remembered so each one is warned about once, not on every poll.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
    skipped: Mutex<BTreeSet<i64>>,
}

impl SqliteTaskStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        info!("Scheduler: task store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            skipped: Mutex::new(BTreeSet::new()),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::LockPoisoned("task store connection".into()))
    }

    /// Persist a small setting as JSON, replacing any previous value.
    pub fn set_value<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
            params![key, json],
        )?;
        Ok(())
    }

    /// Read a setting back. `Ok(None)` when the key is unset.
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn()?
            .query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Every task regardless of status, for inspection.
    pub fn all_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, type, payload, exec_at, status FROM scheduler ORDER BY id")?;
        let rows = stmt.query_map([], read_row)?;
        self.collect_rows(rows)
    }

    /// Ids of rows that could not be decoded so far, ascending.
    pub fn skipped_rows(&self) -> Result<Vec<i64>> {
        Ok(self.skipped()?.iter().copied().collect())
    }

    fn skipped(&self) -> Result<MutexGuard<'_, BTreeSet<i64>>> {
        self.skipped
            .lock()
            .map_err(|_| Error::LockPoisoned("skipped task rows".into()))
    }

    /// Keep the rows that decode; skip the rest, warning once per row id.
    fn collect_rows<I>(&self, rows: I) -> Result<Vec<ScheduledTask>>
    where
        I: Iterator<Item = rusqlite::Result<RawRow>>,
    {
        let mut tasks = Vec::new();
        for row in rows {
            match row {
                Ok(raw) => {
                    let id = raw.0;
                    match decode_row(raw) {
                        Ok(task) => tasks.push(task),
                        Err(reason) => {
                            if self.skipped()?.insert(id) {
                                warn!(task_id = id, "Scheduler: skipping corrupt task row: {}", reason);
                            } else {
                                debug!(task_id = id, "Scheduler: corrupt task row still present");
                            }
                        }
                    }
                }
                Err(e) => warn!("Scheduler: unreadable task row skipped: {}", e),
            }
        }
        Ok(tasks)
    }
}

type RawRow = (i64, Option<String>, Option<String>, Option<String>, Option<String>);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_row((id, task_type, payload, exec_at, status): RawRow) -> std::result::Result<ScheduledTask, String> {
    let task_type = task_type.filter(|t| !t.is_empty()).ok_or("missing type")?;
    let raw_at = exec_at.ok_or("missing exec_at")?;
    let execute_at = parse_exec_at(&raw_at).ok_or_else(|| format!("bad exec_at '{}'", raw_at))?;
    let status = match status {
        Some(s) => TaskStatus::parse(&s).ok_or_else(|| format!("unknown status '{}'", s))?,
        None => TaskStatus::Pending,
    };
    Ok(ScheduledTask {
        id,
        task_type,
        payload: payload.as_deref().map(decode_payload).unwrap_or(Value::Null),
        execute_at,
        status,
    })
}

impl TaskStore for SqliteTaskStore {
    fn add_task(&self, task_type: &str, payload: &Value, execute_at: NaiveDateTime) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO scheduler (type, payload, exec_at) VALUES (?1, ?2, ?3)",
            params![task_type, encode_payload(payload), format_exec_at(execute_at)],
        )?;
        let id = conn.last_insert_rowid();
        info!(task_id = id, task_type, "Scheduler: task added for {}", format_exec_at(execute_at));
        Ok(id)
    }

    fn due_tasks(&self, now: NaiveDateTime) -> Result<Vec<ScheduledTask>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, type, payload, exec_at, status FROM scheduler \
             WHERE exec_at <= ?1 AND status = 'pending' ORDER BY exec_at, id",
        )?;
        let rows = stmt.query_map(params![format_exec_at(now)], read_row)?;
        self.collect_rows(rows)
    }

    fn mark_done(&self, id: i64) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE scheduler SET status = ?1 WHERE id = ?2 AND status = 'pending'",
            params![TaskStatus::Done.as_str(), id],
        )?;
        if changed == 0 {
            warn!(task_id = id, "Scheduler: mark_done matched no pending task");
        }
        Ok(())
    }
}
