// Fire-and-forget persistence: callers enqueue jobs, a single worker task
// drains the queue into the database.
//
// The queue is bounded. When it is full the new job is dropped and counted;
// the simulation never waits on storage. Failed writes are logged and dropped,
// never retried.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::Database;
use crate::engine::session::{SessionInfo, SessionStore};
use crate::metrics;

/// Errors on the persistence path. Logged, never surfaced to clients.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("persistence queue is full")]
    QueueFull,
    #[error("persistence worker has stopped")]
    WorkerGone,
}

/// A write to perform. Carries a copy of every field it needs, taken at
/// enqueue time.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistJob {
    UpsertSession {
        session_id: String,
        name: String,
        /// `None` keeps the stored score.
        score: Option<i64>,
        last_seen: DateTime<Utc>,
    },
    AppendScore {
        name: String,
        score: i64,
        recorded_at: DateTime<Utc>,
    },
}

/// Cloneable sending side of the persistence queue.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::Sender<PersistJob>,
}

impl PersistenceHandle {
    /// Create a handle and the receiving end a worker should drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PersistJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Try to enqueue a job without waiting.
    pub fn enqueue(&self, job: PersistJob) -> Result<(), PersistenceError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PersistenceError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PersistenceError::WorkerGone,
        })
    }

    fn submit(&self, job: PersistJob) {
        if let Err(e) = self.enqueue(job) {
            metrics::PERSIST_JOBS_DROPPED_TOTAL.inc();
            tracing::warn!("Dropping persistence job: {e}");
        }
    }

    pub fn upsert_session(
        &self,
        session_id: &str,
        name: &str,
        score: Option<i64>,
        last_seen: DateTime<Utc>,
    ) {
        self.submit(PersistJob::UpsertSession {
            session_id: session_id.to_string(),
            name: name.to_string(),
            score,
            last_seen,
        });
    }

    pub fn append_score(&self, name: &str, score: i64, recorded_at: DateTime<Utc>) {
        self.submit(PersistJob::AppendScore {
            name: name.to_string(),
            score,
            recorded_at,
        });
    }
}

/// Timestamp format used for every persisted date.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Perform one job against the database.
pub async fn apply_job(db: &Database, job: &PersistJob) -> Result<(), PersistenceError> {
    match job {
        PersistJob::UpsertSession {
            session_id,
            name,
            score,
            last_seen,
        } => {
            db.upsert_session(session_id, name, *score, &format_timestamp(last_seen))
                .await?;
        }
        PersistJob::AppendScore {
            name,
            score,
            recorded_at,
        } => {
            db.append_score(name, *score, &format_timestamp(recorded_at))
                .await?;
        }
    }
    Ok(())
}

/// Seed the session store from persisted records so issued session ids
/// survive a restart. Returns the number of sessions loaded.
pub async fn warm_sessions(db: &Database, store: &SessionStore) -> Result<usize, sqlx::Error> {
    let rows = db.list_sessions().await?;
    let count = rows.len();
    store.seed(rows.into_iter().map(|row| {
        let last_seen = DateTime::parse_from_rfc3339(&row.last_seen)
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        (
            row.session_id,
            SessionInfo {
                name: row.name,
                last_seen,
            },
        )
    }));
    Ok(count)
}

/// Spawn the worker that drains the queue in FIFO order. It stops once every
/// handle has been dropped and the queue is empty.
pub fn spawn_persistence_worker(
    db: Arc<Database>,
    mut rx: mpsc::Receiver<PersistJob>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match apply_job(&db, &job).await {
                Ok(()) => metrics::PERSIST_JOBS_WRITTEN_TOTAL.inc(),
                Err(e) => {
                    metrics::PERSIST_JOBS_FAILED_TOTAL.inc();
                    tracing::warn!(?job, "Persistence write failed: {e}");
                }
            }
        }
        tracing::debug!("Persistence worker stopped");
    })
}
