//! SQLite-backed storage for the invocation log.
//!
//! Two tables: `logs` (one row per tool invocation, written once as
//! in-progress and mutated once to its terminal status) and `sessions`.
//! Connections run in WAL mode and are handed out through a small bounded
//! pool; every statement executes on a blocking worker so the async
//! runtime is never stalled by SQLite.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use indexmap::IndexMap;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::TelemetryError;

/// Hard cap on pool size regardless of configuration.
const MAX_POOL_SIZE: usize = 10;

/// Terminal and in-flight invocation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// Start row written, completion pending.
    InProgress,
    /// Completed normally.
    Success,
    /// Completed with an error.
    Error,
}

impl LogStatus {
    /// Column value for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// One row of the `logs` table.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationLogEntry {
    /// UUID of the invocation.
    pub id: String,
    /// ISO-8601 start time.
    pub timestamp: String,
    /// Tool name as dispatched.
    pub tool_name: String,
    /// Parameter blob.
    pub parameters: Value,
    /// Result blob, absent until the terminal write.
    pub result: Option<Value>,
    /// Wall-clock duration in milliseconds.
    pub execution_time_ms: f64,
    /// Identifier of the calling client.
    pub client_id: String,
    /// Telemetry session the call belongs to.
    pub session_id: String,
    /// Row status.
    pub status: String,
    /// Error text for failed invocations.
    pub error_message: Option<String>,
}

/// One row of the `sessions` table.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySession {
    /// Session identifier.
    pub session_id: String,
    /// Client metadata blob.
    pub client_info: Value,
    /// ISO-8601 session start.
    pub start_time: String,
    /// ISO-8601 session end, absent while active.
    pub end_time: Option<String>,
    /// Tool invocations recorded in the session.
    pub tool_count: i64,
}

/// Aggregate counters for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatistics {
    /// Total rows in `logs`.
    pub total_tool_calls: i64,
    /// Invocations per tool, most used first.
    pub tool_usage: IndexMap<String, i64>,
    /// Rows per status.
    pub status_counts: IndexMap<String, i64>,
}

/// Store handle; cheap to clone via `Arc`.
#[derive(Debug)]
pub struct TelemetryStore {
    pool: Pool,
}

impl TelemetryStore {
    /// Opens (creating if needed) the database at `db_path` and ensures the
    /// schema exists.
    pub fn open(db_path: &Path, pool_size: usize) -> Result<Self, TelemetryError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TelemetryError::TaskFailed(format!("cannot create database directory: {e}"))
                })?;
            }
        }

        let mut conn = open_connection(db_path)?;
        init_schema(&mut conn)?;

        let pool = Pool::new(db_path.to_path_buf(), pool_size.clamp(1, MAX_POOL_SIZE));
        pool.release(conn);
        Ok(Self { pool })
    }

    /// Inserts the in-progress row for a new invocation.
    pub async fn insert_entry(&self, entry: InvocationLogEntry) -> Result<(), TelemetryError> {
        self.pool
            .with(move |conn| {
                conn.execute(
                    "INSERT INTO logs
                     (id, timestamp, tool_name, parameters, result, execution_time_ms,
                      client_id, session_id, status, error_message)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        entry.id,
                        entry.timestamp,
                        entry.tool_name,
                        entry.parameters.to_string(),
                        entry.result.as_ref().map(Value::to_string),
                        entry.execution_time_ms,
                        entry.client_id,
                        entry.session_id,
                        entry.status,
                        entry.error_message,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Terminal write: mutates the invocation row in place.
    pub async fn finish_entry(
        &self,
        id: String,
        result: Option<Value>,
        execution_time_ms: f64,
        status: LogStatus,
        error_message: Option<String>,
    ) -> Result<(), TelemetryError> {
        self.pool
            .with(move |conn| {
                conn.execute(
                    "UPDATE logs
                     SET result = ?1, execution_time_ms = ?2, status = ?3, error_message = ?4
                     WHERE id = ?5",
                    params![
                        result.as_ref().map(Value::to_string),
                        execution_time_ms,
                        status.as_str(),
                        error_message,
                        id,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Creates or replaces a session row.
    pub async fn upsert_session(
        &self,
        session_id: String,
        client_info: Value,
        start_time: String,
    ) -> Result<(), TelemetryError> {
        self.pool
            .with(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO sessions
                     (session_id, client_info, start_time, tool_count)
                     VALUES (?1, ?2, ?3, 0)",
                    params![session_id, client_info.to_string(), start_time],
                )?;
                Ok(())
            })
            .await
    }

    /// Closes a session row.
    pub async fn end_session(
        &self,
        session_id: String,
        end_time: String,
        tool_count: i64,
    ) -> Result<(), TelemetryError> {
        self.pool
            .with(move |conn| {
                conn.execute(
                    "UPDATE sessions SET end_time = ?1, tool_count = ?2 WHERE session_id = ?3",
                    params![end_time, tool_count, session_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Fetches one entry by id. Primarily a test and dashboard hook.
    pub async fn entry(&self, id: String) -> Result<Option<InvocationLogEntry>, TelemetryError> {
        self.pool
            .with(move |conn| {
                conn.query_row("SELECT * FROM logs WHERE id = ?1", params![id], row_to_entry)
                    .optional()
            })
            .await
    }

    /// Most recent entries, optionally filtered by tool and session.
    pub async fn recent_logs(
        &self,
        limit: u32,
        offset: u32,
        tool_name: Option<String>,
        session_id: Option<String>,
    ) -> Result<Vec<InvocationLogEntry>, TelemetryError> {
        self.pool
            .with(move |conn| {
                let mut sql = String::from("SELECT * FROM logs");
                let mut clauses = Vec::new();
                let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
                if let Some(tool) = tool_name {
                    clauses.push("tool_name = ?");
                    args.push(Box::new(tool));
                }
                if let Some(session) = session_id {
                    clauses.push("session_id = ?");
                    args.push(Box::new(session));
                }
                if !clauses.is_empty() {
                    sql.push_str(" WHERE ");
                    sql.push_str(&clauses.join(" AND "));
                }
                sql.push_str(" ORDER BY timestamp DESC LIMIT ? OFFSET ?");
                args.push(Box::new(limit));
                args.push(Box::new(offset));

                let arg_refs: Vec<&dyn rusqlite::ToSql> =
                    args.iter().map(AsRef::as_ref).collect();
                let mut statement = conn.prepare(&sql)?;
                let rows = statement.query_map(&arg_refs[..], row_to_entry)?;
                rows.collect()
            })
            .await
    }

    /// Every session row, newest first.
    pub async fn sessions(&self) -> Result<Vec<TelemetrySession>, TelemetryError> {
        self.pool
            .with(|conn| {
                let mut statement = conn.prepare(
                    "SELECT session_id, client_info, start_time, end_time, tool_count
                     FROM sessions ORDER BY start_time DESC",
                )?;
                let rows = statement.query_map([], |row| {
                    let client_info: Option<String> = row.get(1)?;
                    Ok(TelemetrySession {
                        session_id: row.get(0)?,
                        client_info: parse_blob(client_info),
                        start_time: row.get(2)?,
                        end_time: row.get(3)?,
                        tool_count: row.get(4)?,
                    })
                })?;
                rows.collect()
            })
            .await
    }

    /// Aggregate counters over the whole log.
    pub async fn statistics(&self) -> Result<StoreStatistics, TelemetryError> {
        self.pool
            .with(|conn| {
                let total_tool_calls =
                    conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))?;

                let mut tool_usage = IndexMap::new();
                let mut statement = conn.prepare(
                    "SELECT tool_name, COUNT(*) AS count FROM logs
                     GROUP BY tool_name ORDER BY count DESC",
                )?;
                let rows =
                    statement.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get(1)?)))?;
                for row in rows {
                    let (tool, count) = row?;
                    tool_usage.insert(tool, count);
                }

                let mut status_counts = IndexMap::new();
                let mut statement =
                    conn.prepare("SELECT status, COUNT(*) FROM logs GROUP BY status")?;
                let rows =
                    statement.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get(1)?)))?;
                for row in rows {
                    let (status, count) = row?;
                    status_counts.insert(status, count);
                }

                Ok(StoreStatistics {
                    total_tool_calls,
                    tool_usage,
                    status_counts,
                })
            })
            .await
    }

    /// Deletes entries older than `cutoff` (ISO-8601). Returns rows removed.
    pub async fn purge_older_than(&self, cutoff: String) -> Result<usize, TelemetryError> {
        self.pool
            .with(move |conn| conn.execute("DELETE FROM logs WHERE timestamp < ?1", params![cutoff]))
            .await
    }

    /// Marks stale in-progress rows (older than `cutoff`) as orphaned
    /// errors. Run once at startup to reconcile after a crash.
    pub async fn reconcile_orphans(&self, cutoff: String) -> Result<usize, TelemetryError> {
        self.pool
            .with(move |conn| {
                conn.execute(
                    "UPDATE logs SET status = 'error', error_message = 'orphaned'
                     WHERE status = 'in_progress' AND timestamp < ?1",
                    params![cutoff],
                )
            })
            .await
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvocationLogEntry> {
    let parameters: Option<String> = row.get("parameters")?;
    let result: Option<String> = row.get("result")?;
    Ok(InvocationLogEntry {
        id: row.get("id")?,
        timestamp: row.get("timestamp")?,
        tool_name: row.get("tool_name")?,
        parameters: parse_blob(parameters),
        result: result.map(|raw| parse_blob(Some(raw))),
        execution_time_ms: row.get("execution_time_ms")?,
        client_id: row.get("client_id")?,
        session_id: row.get("session_id")?,
        status: row.get("status")?,
        error_message: row.get("error_message")?,
    })
}

fn parse_blob(raw: Option<String>) -> Value {
    raw.and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(Value::Null)
}

fn open_connection(db_path: &Path) -> Result<Connection, TelemetryError> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

fn init_schema(conn: &mut Connection) -> Result<(), TelemetryError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS logs (
             id TEXT PRIMARY KEY,
             timestamp TEXT NOT NULL,
             tool_name TEXT NOT NULL,
             parameters TEXT,
             result TEXT,
             execution_time_ms REAL,
             client_id TEXT,
             session_id TEXT,
             status TEXT,
             error_message TEXT
         );
         CREATE TABLE IF NOT EXISTS sessions (
             session_id TEXT PRIMARY KEY,
             client_info TEXT,
             start_time TEXT,
             end_time TEXT,
             tool_count INTEGER DEFAULT 0
         );
         CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);
         CREATE INDEX IF NOT EXISTS idx_logs_tool_name ON logs(tool_name);
         CREATE INDEX IF NOT EXISTS idx_logs_session_id ON logs(session_id);",
    )?;
    Ok(())
}

/// Bounded connection pool. A permit gates each borrow; connections are
/// created lazily up to the cap and returned after every statement, so no
/// connection is ever held across a foreign suspension point.
#[derive(Debug)]
struct Pool {
    db_path: PathBuf,
    connections: StdMutex<VecDeque<Connection>>,
    semaphore: Semaphore,
}

impl Pool {
    fn new(db_path: PathBuf, size: usize) -> Self {
        Self {
            db_path,
            connections: StdMutex::new(VecDeque::with_capacity(size)),
            semaphore: Semaphore::new(size),
        }
    }

    fn release(&self, conn: Connection) {
        self.connections.lock().unwrap().push_back(conn);
    }

    async fn with<T, F>(&self, f: F) -> Result<T, TelemetryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| TelemetryError::ShutDown)?;

        let conn = self.connections.lock().unwrap().pop_front();
        let mut conn = match conn {
            Some(conn) => conn,
            None => open_connection(&self.db_path)?,
        };

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&mut conn);
            (conn, result)
        })
        .await
        .map_err(|e| TelemetryError::TaskFailed(e.to_string()))?;

        self.release(conn);
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_store() -> (tempfile::TempDir, TelemetryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TelemetryStore::open(&dir.path().join("logs.db"), 2).unwrap();
        (dir, store)
    }

    fn entry(id: &str, timestamp: &str) -> InvocationLogEntry {
        InvocationLogEntry {
            id: id.to_string(),
            timestamp: timestamp.to_string(),
            tool_name: "swift_analyze_file".to_string(),
            parameters: json!({"file_path": "/tmp/A.swift"}),
            result: None,
            execution_time_ms: 0.0,
            client_id: "client".to_string(),
            session_id: "session".to_string(),
            status: LogStatus::InProgress.as_str().to_string(),
            error_message: None,
        }
    }

    #[tokio::test]
    async fn start_and_terminal_write_target_one_row() {
        let (_dir, store) = test_store();
        store.insert_entry(entry("a", "2026-01-01T00:00:00+00:00")).await.unwrap();
        store
            .finish_entry(
                "a".to_string(),
                Some(json!({"ok": true})),
                12.5,
                LogStatus::Success,
                None,
            )
            .await
            .unwrap();

        let row = store.entry("a".to_string()).await.unwrap().unwrap();
        assert_eq!(row.status, "success");
        assert_eq!(row.execution_time_ms, 12.5);
        assert_eq!(row.result.unwrap()["ok"], true);

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_tool_calls, 1);
        assert_eq!(stats.status_counts.get("success"), Some(&1));
    }

    #[tokio::test]
    async fn orphan_reconciliation_targets_only_stale_in_progress() {
        let (_dir, store) = test_store();
        store.insert_entry(entry("old", "2026-01-01T00:00:00+00:00")).await.unwrap();
        store.insert_entry(entry("new", "2099-01-01T00:00:00+00:00")).await.unwrap();
        store.insert_entry(entry("done", "2026-01-01T00:00:00+00:00")).await.unwrap();
        store
            .finish_entry("done".to_string(), None, 1.0, LogStatus::Success, None)
            .await
            .unwrap();

        let reconciled = store
            .reconcile_orphans("2026-06-01T00:00:00+00:00".to_string())
            .await
            .unwrap();
        assert_eq!(reconciled, 1);

        let old = store.entry("old".to_string()).await.unwrap().unwrap();
        assert_eq!(old.status, "error");
        assert_eq!(old.error_message.as_deref(), Some("orphaned"));
        let fresh = store.entry("new".to_string()).await.unwrap().unwrap();
        assert_eq!(fresh.status, "in_progress");
    }

    #[tokio::test]
    async fn retention_purge_removes_old_rows() {
        let (_dir, store) = test_store();
        store.insert_entry(entry("ancient", "2020-01-01T00:00:00+00:00")).await.unwrap();
        store.insert_entry(entry("recent", "2099-01-01T00:00:00+00:00")).await.unwrap();

        let removed = store
            .purge_older_than("2026-01-01T00:00:00+00:00".to_string())
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.entry("ancient".to_string()).await.unwrap().is_none());
        assert!(store.entry("recent".to_string()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn filtered_queries_and_sessions() {
        let (_dir, store) = test_store();
        let mut other = entry("b", "2026-01-02T00:00:00+00:00");
        other.tool_name = "swift_build_index".to_string();
        store.insert_entry(entry("a", "2026-01-01T00:00:00+00:00")).await.unwrap();
        store.insert_entry(other).await.unwrap();

        let only_build = store
            .recent_logs(10, 0, Some("swift_build_index".to_string()), None)
            .await
            .unwrap();
        assert_eq!(only_build.len(), 1);
        assert_eq!(only_build[0].id, "b");

        store
            .upsert_session(
                "session".to_string(),
                json!({"name": "client"}),
                "2026-01-01T00:00:00+00:00".to_string(),
            )
            .await
            .unwrap();
        store
            .end_session("session".to_string(), "2026-01-01T01:00:00+00:00".to_string(), 2)
            .await
            .unwrap();

        let sessions = store.sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].tool_count, 2);
        assert!(sessions[0].end_time.is_some());
    }

    #[tokio::test]
    async fn pool_serves_concurrent_writers() {
        let (_dir, store) = test_store();
        let store = std::sync::Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .insert_entry(entry(&format!("id-{i}"), "2026-01-01T00:00:00+00:00"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_tool_calls, 20);
    }
}
