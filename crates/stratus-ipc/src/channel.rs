//! CompanionChannel - line-oriented event channel over a Unix socket
//!
//! ## Tasks
//!
//! ```text
//! emit() ──try_send──► mpsc ──► writer task ──"EVENT {...}"──┐
//!                                                            ▼
//!                                                   UnixStream (shared write half)
//!                                                            ▲
//! companion ──"any line"──► reader task ──────"ACK n"────────┘
//! ```
//!
//! `emit` never blocks. Events that do not fit the queue are dropped and
//! logged.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stratus_core::ports::{ISyncEventSink, SyncEvent};

use crate::IpcError;

/// Events queued for the writer before new ones are dropped
pub const QUEUE_CAPACITY: usize = 256;

type SharedWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// Encodes `event` as one `EVENT <json>\n` line tagged with `domain`
///
/// # Errors
///
/// Returns [`IpcError::Encode`] if the event cannot be serialized.
pub fn encode_event(domain: &str, event: &SyncEvent) -> Result<String, IpcError> {
    let mut value = serde_json::to_value(event)?;
    if let Value::Object(map) = &mut value {
        map.insert("domain".to_string(), Value::String(domain.to_string()));
    }
    Ok(format!("EVENT {}\n", serde_json::to_string(&value)?))
}

/// Sink that forwards sync events to a connected companion process
pub struct CompanionChannel {
    domain: String,
    tx: Mutex<Option<mpsc::Sender<SyncEvent>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    acks: Arc<AtomicU64>,
}

impl CompanionChannel {
    /// Connects to the companion listening on `socket_path`
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Connect`] if the socket cannot be reached.
    pub async fn connect(socket_path: &Path, domain: impl Into<String>) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|source| IpcError::Connect {
                path: socket_path.display().to_string(),
                source,
            })?;
        let channel = Self::from_stream(stream, domain);
        info!(socket = %socket_path.display(), domain = %channel.domain, "Companion channel connected");
        Ok(channel)
    }

    /// Wraps an already connected stream
    pub fn from_stream(stream: UnixStream, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        let (read_half, write_half) = stream.into_split();
        let write_half: SharedWriter = Arc::new(tokio::sync::Mutex::new(write_half));
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        let acks = Arc::new(AtomicU64::new(0));

        let writer = tokio::spawn(write_events(domain.clone(), rx, Arc::clone(&write_half)));
        let reader = tokio::spawn(answer_lines(
            read_half,
            write_half,
            cancel.clone(),
            Arc::clone(&acks),
        ));

        Self {
            domain,
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
            cancel,
            acks,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Number of inbound lines acknowledged so far
    pub fn acks_sent(&self) -> u64 {
        self.acks.load(Ordering::SeqCst)
    }

    /// Queues an event for the writer
    ///
    /// # Errors
    ///
    /// [`IpcError::Closed`] after shutdown or when the writer has stopped.
    /// A full queue is reported the same way.
    pub fn try_emit(&self, event: SyncEvent) -> Result<(), IpcError> {
        let guard = self.tx.lock().map_err(|_| IpcError::Closed)?;
        let tx = guard.as_ref().ok_or(IpcError::Closed)?;
        tx.try_send(event).map_err(|_| IpcError::Closed)
    }

    /// Flushes queued events, closes the writer and stops the reader
    pub async fn shutdown(&self) {
        let tx = self.tx.lock().ok().and_then(|mut guard| guard.take());
        drop(tx);

        let writer = self.writer.lock().ok().and_then(|mut guard| guard.take());
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                warn!(error = %e, "Companion writer ended abnormally");
            }
        }

        self.cancel.cancel();
        let reader = self.reader.lock().ok().and_then(|mut guard| guard.take());
        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                warn!(error = %e, "Companion reader ended abnormally");
            }
        }
        info!(domain = %self.domain, "Companion channel closed");
    }
}

impl ISyncEventSink for CompanionChannel {
    fn emit(&self, event: SyncEvent) {
        let kind = event.kind();
        if let Err(e) = self.try_emit(event) {
            warn!(event = kind, error = %e, "Dropping companion event");
        }
    }
}

impl Drop for CompanionChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Tasks
// ============================================================================

async fn write_events(domain: String, mut rx: mpsc::Receiver<SyncEvent>, writer: SharedWriter) {
    while let Some(event) = rx.recv().await {
        let line = match encode_event(&domain, &event) {
            Ok(line) => line,
            Err(e) => {
                warn!(event = event.kind(), error = %e, "Skipping unencodable event");
                continue;
            }
        };
        let mut half = writer.lock().await;
        if let Err(e) = half.write_all(line.as_bytes()).await {
            warn!(error = %e, "Companion write failed, stopping writer");
            return;
        }
        debug!(event = event.kind(), "Event sent to companion");
    }

    if let Err(e) = writer.lock().await.shutdown().await {
        debug!(error = %e, "Companion write half already closed");
    }
}

async fn answer_lines(
    read_half: OwnedReadHalf,
    writer: SharedWriter,
    cancel: CancellationToken,
    acks: Arc<AtomicU64>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let n = acks.fetch_add(1, Ordering::SeqCst) + 1;
                let mut half = writer.lock().await;
                if let Err(e) = half.write_all(format!("ACK {}\n", n).as_bytes()).await {
                    warn!(error = %e, "Companion acknowledgement failed");
                    break;
                }
            }
            Ok(None) => {
                debug!("Companion closed its end");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Companion read failed");
                break;
            }
        }
    }
}
