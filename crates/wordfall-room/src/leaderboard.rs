//! Global top scores.
//!
//! Rooms never talk to storage directly. When a game ends with a
//! qualifying result the room hands one [`LeaderboardEntry`] to a
//! [`LeaderboardSubmitter`] (a non-blocking queue push) and moves on. A
//! background [`LeaderboardWriter`] task drains the queue into a
//! [`LeaderboardSink`], retrying with exponential backoff, and reports
//! entries it finally gave up on as [`PersistenceFailure`]s.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, warn};
use wordfall_protocol::LeaderboardEntry;

/// Errors from a leaderboard store.
#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error("leaderboard I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored data exists but doesn't parse.
    #[error("leaderboard data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("leaderboard unavailable: {0}")]
    Unavailable(String),
}

/// A durable sorted-score store.
///
/// `submit` keeps the maximum score seen per identity; `top` returns the
/// best `limit` entries, highest first.
pub trait LeaderboardSink: Send + Sync + 'static {
    fn submit(
        &self,
        entry: LeaderboardEntry,
    ) -> impl Future<Output = Result<(), LeaderboardError>> + Send;

    fn top(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<LeaderboardEntry>, LeaderboardError>> + Send;
}

fn ranked(scores: &HashMap<String, u64>, limit: usize) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = scores
        .iter()
        .map(|(identity, &score)| LeaderboardEntry {
            identity: identity.clone(),
            score,
        })
        .collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.identity.cmp(&b.identity)));
    entries.truncate(limit);
    entries
}

fn keep_max(scores: &mut HashMap<String, u64>, entry: LeaderboardEntry) {
    let best = scores.entry(entry.identity).or_insert(0);
    *best = (*best).max(entry.score);
}

// ---------------------------------------------------------------------------
// MemoryLeaderboard
// ---------------------------------------------------------------------------

/// In-process store. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryLeaderboard {
    scores: Mutex<HashMap<String, u64>>,
}

impl MemoryLeaderboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaderboardSink for MemoryLeaderboard {
    async fn submit(&self, entry: LeaderboardEntry) -> Result<(), LeaderboardError> {
        keep_max(&mut *self.scores.lock().await, entry);
        Ok(())
    }

    async fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        Ok(ranked(&*self.scores.lock().await, limit))
    }
}

// ---------------------------------------------------------------------------
// FileLeaderboard
// ---------------------------------------------------------------------------

/// A JSON file holding every identity's best score.
///
/// Writes go to a sibling temp file first and are renamed into place, so
/// a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct FileLeaderboard {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLeaderboard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, u64>, LeaderboardError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<LeaderboardEntry> = serde_json::from_slice(&bytes)?;
        Ok(entries.into_iter().map(|e| (e.identity, e.score)).collect())
    }

    async fn store(&self, scores: &HashMap<String, u64>) -> Result<(), LeaderboardError> {
        let json = serde_json::to_vec_pretty(&ranked(scores, usize::MAX))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl LeaderboardSink for FileLeaderboard {
    async fn submit(&self, entry: LeaderboardEntry) -> Result<(), LeaderboardError> {
        let _guard = self.lock.lock().await;
        let mut scores = self.load().await?;
        keep_max(&mut scores, entry);
        self.store(&scores).await
    }

    async fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let _guard = self.lock.lock().await;
        Ok(ranked(&self.load().await?, limit))
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Backoff and queueing settings for the writer.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per entry, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubles for every further retry.
    pub base_delay: Duration,
    /// Entries waiting to be written. Submissions beyond this are dropped.
    pub queue_capacity: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
            queue_capacity: 64,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// An entry the writer gave up on.
#[derive(Debug, Clone, thiserror::Error)]
#[error("leaderboard write for {} failed after {attempts} attempts: {reason}", .entry.identity)]
pub struct PersistenceFailure {
    pub entry: LeaderboardEntry,
    pub attempts: u32,
    pub reason: String,
}

/// Cheap, cloneable hand-off point into the writer queue.
#[derive(Debug, Clone)]
pub struct LeaderboardSubmitter {
    tx: mpsc::Sender<LeaderboardEntry>,
}

impl LeaderboardSubmitter {
    /// Queues an entry without waiting. Returns `false` if it was dropped
    /// because the queue is full or the writer is gone.
    pub fn submit(&self, entry: LeaderboardEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(entry)) => {
                warn!(identity = %entry.identity, score = entry.score, "leaderboard queue full, dropping entry");
                false
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                warn!(identity = %entry.identity, "leaderboard writer stopped, dropping entry");
                false
            }
        }
    }
}

/// Handle to the background task that owns the sink. The task runs
/// until every submitter is gone.
pub struct LeaderboardWriter {
    submitter: LeaderboardSubmitter,
    failures: Option<mpsc::UnboundedReceiver<PersistenceFailure>>,
}

impl LeaderboardWriter {
    /// Spawns the writer task. Must be called inside a Tokio runtime.
    pub fn spawn<S: LeaderboardSink>(sink: Arc<S>, policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::channel(policy.queue_capacity.max(1));
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(sink, policy, rx, failures_tx));

        Self {
            submitter: LeaderboardSubmitter { tx },
            failures: Some(failures_rx),
        }
    }

    pub fn submitter(&self) -> LeaderboardSubmitter {
        self.submitter.clone()
    }

    /// The error channel. Can be taken once; if nobody takes it, failures
    /// are only logged.
    pub fn take_failures(&mut self) -> Option<mpsc::UnboundedReceiver<PersistenceFailure>> {
        self.failures.take()
    }
}

async fn run_writer<S: LeaderboardSink>(
    sink: Arc<S>,
    policy: RetryPolicy,
    mut rx: mpsc::Receiver<LeaderboardEntry>,
    failures: mpsc::UnboundedSender<PersistenceFailure>,
) {
    while let Some(entry) = rx.recv().await {
        if let Err(failure) = write_with_retry(&*sink, &policy, entry).await {
            error!(%failure, "giving up on leaderboard entry");
            // Nobody listening is fine: the log line above is the record.
            let _ = failures.send(failure);
        }
    }
    debug!("leaderboard writer stopped");
}

async fn write_with_retry<S: LeaderboardSink>(
    sink: &S,
    policy: &RetryPolicy,
    entry: LeaderboardEntry,
) -> Result<(), PersistenceFailure> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match sink.submit(entry.clone()).await {
            Ok(()) => {
                debug!(identity = %entry.identity, score = entry.score, attempt, "leaderboard entry written");
                return Ok(());
            }
            Err(e) if attempt < attempts => {
                let delay = policy.delay_after(attempt);
                warn!(identity = %entry.identity, attempt, error = %e, ?delay, "leaderboard write failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(PersistenceFailure {
                    entry,
                    attempts: attempt,
                    reason: e.to_string(),
                });
            }
        }
    }
}
