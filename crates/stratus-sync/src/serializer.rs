//! Operation ordering lanes.
//!
//! Provides [`OperationSerializer`], which runs submitted jobs one at a time
//! per [`LaneKey`] in submission order. Different lanes run independently.
//!
//! ```text
//! ┌─────────────┐   boxed job    ┌──────────────────┐
//! │   caller    │ ─────────────► │   lane worker    │  (one per LaneKey)
//! │  (engine)   │                │  awaits each job │
//! └─────────────┘                │  to completion   │
//!       ▲                        └──────────────────┘
//!       │      output via oneshot         │
//!       └─────────────────────────────────┘
//! ```
//!
//! A job is a whole operation, remote call and store write-back included,
//! so the next job on the lane never observes a half-finished predecessor.
//! A job must not submit to its own lane and wait for the result.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use stratus_core::domain::{RemotePath, SyncError};

/// Jobs queued per lane before `submit` starts waiting for room
const LANE_CAPACITY: usize = 64;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// ============================================================================
// LaneKey
// ============================================================================

/// Identifies one ordering lane
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LaneKey {
    /// Everything in a synchronization domain
    Domain(String),
    /// One top-level directory of a domain
    Subtree { domain: String, top_level: String },
}

impl LaneKey {
    pub fn domain(domain: impl Into<String>) -> Self {
        LaneKey::Domain(domain.into())
    }

    /// Lane for the top-level subtree containing `path`
    ///
    /// The root itself, and anything directly below it, belongs to the
    /// domain lane.
    pub fn for_path(domain: &str, path: &RemotePath) -> Self {
        let mut segments = path.as_str().split('/').filter(|s| !s.is_empty());
        match (segments.next(), segments.next()) {
            (Some(top_level), Some(_)) => LaneKey::Subtree {
                domain: domain.to_string(),
                top_level: top_level.to_string(),
            },
            _ => LaneKey::Domain(domain.to_string()),
        }
    }
}

impl std::fmt::Display for LaneKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaneKey::Domain(domain) => write!(f, "{}", domain),
            LaneKey::Subtree { domain, top_level } => write!(f, "{}:/{}", domain, top_level),
        }
    }
}

// ============================================================================
// OperationSerializer
// ============================================================================

struct LaneHandle {
    tx: mpsc::Sender<Job>,
    worker: JoinHandle<()>,
}

fn spawn_lane(key: LaneKey) -> LaneHandle {
    let (tx, mut rx) = mpsc::channel::<Job>(LANE_CAPACITY);
    let worker = tokio::spawn(async move {
        tracing::debug!(lane = %key, "Operation lane started");
        while let Some(job) = rx.recv().await {
            job.await;
        }
        tracing::debug!(lane = %key, "Operation lane stopped");
    });
    LaneHandle { tx, worker }
}

/// Per-lane FIFO executor with one in-flight job per lane
///
/// Lanes are created on first use. Must be used from within a tokio runtime.
pub struct OperationSerializer {
    lanes: DashMap<LaneKey, LaneHandle>,
    closed: AtomicBool,
}

impl Default for OperationSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationSerializer {
    pub fn new() -> Self {
        Self {
            lanes: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Runs `job` on `lane` after every job submitted before it
    ///
    /// Returns the job's output once it has run to completion.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the serializer was shut down or the
    /// lane worker died before delivering the output.
    pub async fn submit<F, T>(&self, lane: &LaneKey, job: F) -> Result<T, SyncError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::Storage("operation serializer is shut down".to_string()));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let boxed: Job = Box::pin(async move {
            let output = job.await;
            let _ = reply_tx.send(output);
        });

        let tx = self.sender(lane);
        tx.send(boxed).await.map_err(|_| {
            SyncError::Storage(format!("operation lane {} has stopped", lane))
        })?;

        reply_rx.await.map_err(|_| {
            SyncError::Storage(format!("operation lane {} dropped the result", lane))
        })
    }

    /// Number of live lanes
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Stops accepting jobs and waits for every lane to drain
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let keys: Vec<LaneKey> = self.lanes.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, handle)) = self.lanes.remove(&key) {
                drop(handle.tx);
                if let Err(e) = handle.worker.await {
                    tracing::warn!(lane = %key, error = %e, "Operation lane ended abnormally");
                }
            }
        }
        tracing::info!("Operation serializer shut down");
    }

    /// Sender for `lane`, replacing a lane whose worker has died
    fn sender(&self, lane: &LaneKey) -> mpsc::Sender<Job> {
        let mut entry = self
            .lanes
            .entry(lane.clone())
            .or_insert_with(|| spawn_lane(lane.clone()));
        if entry.tx.is_closed() {
            tracing::warn!(lane = %lane, "Operation lane worker died, restarting");
            *entry = spawn_lane(lane.clone());
        }
        entry.tx.clone()
    }
}
