//! Telemetry sink: durable invocation log with live fan-out.
//!
//! Producers call [`TelemetrySink::log_start`] and [`TelemetrySink::log_end`]
//! which only push onto a bounded in-memory queue; a single background
//! worker drains the queue into the store and broadcasts each entry to the
//! registered observers. Tool handlers never block on telemetry: when the
//! queue is full the oldest queued item is dropped and counted.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use crate::config::Config;
use crate::error::TelemetryError;

use super::store::{InvocationLogEntry, LogStatus, StoreStatistics, TelemetryStore};

/// How often the retention sweeper runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
/// In-progress rows older than this many hours are reconciled to
/// `orphaned` at startup.
const ORPHAN_CUTOFF_HOURS: i64 = 1;
/// Buffered messages per observer channel.
const OBSERVER_CHANNEL_CAPACITY: usize = 64;

/// Aggregate view over the store plus live sink state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SinkStatistics {
    /// Counters from the database.
    #[serde(flatten)]
    pub store: StoreStatistics,
    /// Sessions currently active in this process.
    pub active_sessions: usize,
    /// Observers currently registered.
    pub observers: usize,
    /// Entries dropped because the queue was full.
    pub dropped_entries: u64,
}

#[derive(Debug)]
enum QueueItem {
    Start(InvocationLogEntry),
    End {
        id: String,
        result: Option<Value>,
        execution_time_ms: f64,
        status: LogStatus,
        error_message: Option<String>,
    },
}

#[derive(Debug)]
struct Observer {
    id: u64,
    tx: mpsc::Sender<String>,
}

#[derive(Debug)]
struct SinkShared {
    queue: StdMutex<VecDeque<QueueItem>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    observers: StdMutex<Vec<Observer>>,
    observer_timeout: Duration,
    shutting_down: AtomicBool,
}

/// The process-wide telemetry sink. Constructed once at startup and passed
/// explicitly to the dispatch layer.
#[derive(Debug)]
pub struct TelemetrySink {
    shared: Arc<SinkShared>,
    store: Arc<TelemetryStore>,
    active_sessions: StdMutex<HashMap<String, i64>>,
    next_observer_id: AtomicU64,
    worker: StdMutex<Option<tokio::task::JoinHandle<()>>>,
    sweeper: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TelemetrySink {
    /// Starts the sink: spawns the queue worker and the retention sweeper
    /// (which first reconciles rows orphaned by a previous crash).
    pub fn start(store: Arc<TelemetryStore>, config: &Config) -> Arc<Self> {
        let shared = Arc::new(SinkShared {
            queue: StdMutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: config.queue_capacity,
            dropped: AtomicU64::new(0),
            observers: StdMutex::new(Vec::new()),
            observer_timeout: config.observer_timeout,
            shutting_down: AtomicBool::new(false),
        });

        let worker = tokio::spawn(worker_loop(Arc::clone(&shared), Arc::clone(&store)));
        let sweeper = tokio::spawn(sweeper_loop(
            Arc::clone(&store),
            config.log_retention_days,
        ));

        Arc::new(Self {
            shared,
            store,
            active_sessions: StdMutex::new(HashMap::new()),
            next_observer_id: AtomicU64::new(1),
            worker: StdMutex::new(Some(worker)),
            sweeper: StdMutex::new(Some(sweeper)),
        })
    }

    /// Records the start of a tool invocation and returns its log id.
    /// Synchronous and non-blocking by contract.
    pub fn log_start(
        &self,
        tool_name: &str,
        parameters: Value,
        client_id: &str,
        session_id: &str,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let entry = InvocationLogEntry {
            id: id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            tool_name: tool_name.to_string(),
            parameters,
            result: None,
            execution_time_ms: 0.0,
            client_id: client_id.to_string(),
            session_id: session_id.to_string(),
            status: LogStatus::InProgress.as_str().to_string(),
            error_message: None,
        };

        if let Some(count) = self
            .active_sessions
            .lock()
            .unwrap()
            .get_mut(session_id)
        {
            *count += 1;
        }

        self.enqueue(QueueItem::Start(entry));
        id
    }

    /// Records the terminal state of an invocation started with
    /// [`log_start`](Self::log_start).
    pub fn log_end(
        &self,
        id: &str,
        result: Option<Value>,
        execution_time_ms: f64,
        status: LogStatus,
        error_message: Option<String>,
    ) {
        self.enqueue(QueueItem::End {
            id: id.to_string(),
            result,
            execution_time_ms,
            status,
            error_message,
        });
    }

    /// Opens a telemetry session for a connected client.
    pub async fn start_session(
        &self,
        session_id: &str,
        client_info: Value,
    ) -> Result<(), TelemetryError> {
        self.active_sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), 0);
        self.store
            .upsert_session(
                session_id.to_string(),
                client_info,
                Utc::now().to_rfc3339(),
            )
            .await
    }

    /// Closes a telemetry session, persisting its tool count.
    pub async fn end_session(&self, session_id: &str) -> Result<(), TelemetryError> {
        let tool_count = self
            .active_sessions
            .lock()
            .unwrap()
            .remove(session_id)
            .unwrap_or(0);
        self.store
            .end_session(session_id.to_string(), Utc::now().to_rfc3339(), tool_count)
            .await
    }

    /// Registers a live observer. The returned receiver yields each entry
    /// serialized once as JSON; slow or dead observers are dropped by the
    /// fan-out, not retried.
    pub fn register_observer(&self) -> (u64, mpsc::Receiver<String>) {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(OBSERVER_CHANNEL_CAPACITY);
        self.shared
            .observers
            .lock()
            .unwrap()
            .push(Observer { id, tx });
        (id, rx)
    }

    /// Removes a previously registered observer.
    pub fn unregister_observer(&self, id: u64) {
        self.shared
            .observers
            .lock()
            .unwrap()
            .retain(|observer| observer.id != id);
    }

    /// Aggregate statistics for the dashboard collaborator.
    pub async fn statistics(&self) -> Result<SinkStatistics, TelemetryError> {
        let store = self.store.statistics().await?;
        Ok(SinkStatistics {
            store,
            active_sessions: self.active_sessions.lock().unwrap().len(),
            observers: self.shared.observers.lock().unwrap().len(),
            dropped_entries: self.shared.dropped.load(Ordering::Relaxed),
        })
    }

    /// Read access to recent log rows (dashboard collaborator surface).
    pub async fn recent_logs(
        &self,
        limit: u32,
        offset: u32,
        tool_name: Option<String>,
        session_id: Option<String>,
    ) -> Result<Vec<InvocationLogEntry>, TelemetryError> {
        self.store.recent_logs(limit, offset, tool_name, session_id).await
    }

    /// Entries dropped so far because the queue was full.
    pub fn dropped_entries(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stops the worker after draining whatever is queued, then stops the
    /// sweeper and closes every active session.
    pub async fn shutdown(&self) {
        self.shared.shutting_down.store(true, Ordering::Release);
        self.shared.notify.notify_one();

        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "telemetry worker did not shut down cleanly");
            }
        }
        let sweeper = self.sweeper.lock().unwrap().take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        let sessions: Vec<String> = self
            .active_sessions
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        for session_id in sessions {
            if let Err(e) = self.end_session(&session_id).await {
                tracing::warn!(error = %e, session_id, "failed to close telemetry session");
            }
        }
    }

    fn enqueue(&self, item: QueueItem) {
        {
            let mut queue = self.shared.queue.lock().unwrap();
            if queue.len() >= self.shared.capacity {
                queue.pop_front();
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(item);
        }
        self.shared.notify.notify_one();
    }
}

/// Drains the queue: one durable write per item, then one serialization
/// shared by every observer send.
async fn worker_loop(shared: Arc<SinkShared>, store: Arc<TelemetryStore>) {
    loop {
        let item = shared.queue.lock().unwrap().pop_front();
        let Some(item) = item else {
            if shared.shutting_down.load(Ordering::Acquire) {
                break;
            }
            shared.notify.notified().await;
            continue;
        };

        let broadcast = match item {
            QueueItem::Start(entry) => {
                let message = json!({"type": "log_entry", "data": &entry});
                if let Err(e) = store.insert_entry(entry).await {
                    tracing::warn!(error = %e, "failed to persist log entry");
                }
                message
            }
            QueueItem::End {
                id,
                result,
                execution_time_ms,
                status,
                error_message,
            } => {
                let message = json!({
                    "type": "log_update",
                    "data": {
                        "id": &id,
                        "result": &result,
                        "execution_time_ms": execution_time_ms,
                        "status": status.as_str(),
                        "error_message": &error_message,
                    },
                });
                if let Err(e) = store
                    .finish_entry(id, result, execution_time_ms, status, error_message)
                    .await
                {
                    tracing::warn!(error = %e, "failed to persist log update");
                }
                message
            }
        };

        fan_out(&shared, broadcast.to_string()).await;
    }
}

/// Sends to every observer concurrently with a per-observer deadline;
/// observers that err or time out are removed.
async fn fan_out(shared: &SinkShared, message: String) {
    let observers: Vec<(u64, mpsc::Sender<String>)> = shared
        .observers
        .lock()
        .unwrap()
        .iter()
        .map(|observer| (observer.id, observer.tx.clone()))
        .collect();
    if observers.is_empty() {
        return;
    }

    let sends = observers.into_iter().map(|(id, tx)| {
        let message = message.clone();
        let deadline = shared.observer_timeout;
        async move {
            match tokio::time::timeout(deadline, tx.send(message)).await {
                Ok(Ok(())) => None,
                _ => Some(id),
            }
        }
    });

    let failed: Vec<u64> = futures::future::join_all(sends)
        .await
        .into_iter()
        .flatten()
        .collect();
    if !failed.is_empty() {
        shared
            .observers
            .lock()
            .unwrap()
            .retain(|observer| !failed.contains(&observer.id));
        tracing::debug!(removed = failed.len(), "dropped unresponsive observers");
    }
}

/// Reconciles crash orphans once, then periodically enforces retention.
async fn sweeper_loop(store: Arc<TelemetryStore>, retention_days: u32) {
    let orphan_cutoff = (Utc::now() - chrono::Duration::hours(ORPHAN_CUTOFF_HOURS)).to_rfc3339();
    match store.reconcile_orphans(orphan_cutoff).await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "reconciled orphaned in-progress entries"),
        Err(e) => tracing::warn!(error = %e, "orphan reconciliation failed"),
    }

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let cutoff = (Utc::now() - chrono::Duration::days(i64::from(retention_days))).to_rfc3339();
        match store.purge_older_than(cutoff).await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "purged expired log entries"),
            Err(e) => tracing::warn!(error = %e, "retention sweep failed"),
        }
    }
}
