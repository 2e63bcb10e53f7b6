//! Shared fixtures for engine integration tests
//!
//! [`ScriptedRemote`] is an in-memory remote that records every call and can
//! be told to fail or stall. [`Harness`] wires it to an in-memory SQLite
//! store, a broadcast signaler and a recording event sink.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;

use stratus_cache::{DatabasePool, SqliteMetadataStore};
use stratus_core::config::EnumerationMode;
use stratus_core::domain::{
    Account, ItemId, ItemRecord, RemoteError, RemotePath, TransferHandle,
};
use stratus_core::ports::{
    ChangeSignal, DownloadOutcome, IMetadataStore, IRemoteClient, ISyncEventSink, ListDepth,
    RemoteEntry, SyncEvent, TransferObserver, UploadOutcome,
};
use stratus_sync::{BroadcastSignaler, EngineSettings, SyncEngine};

// ============================================================================
// ScriptedRemote
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Move(String, String),
    CreateDirectory(String),
    Upload(String),
    Download(String),
    Delete(String),
    List(String, ListDepth),
}

#[derive(Default)]
pub struct ScriptedRemote {
    calls: Mutex<Vec<Call>>,
    tree: Mutex<Vec<RemoteEntry>>,
    fail_upload: Mutex<Option<RemoteError>>,
    fail_download: Mutex<Option<RemoteError>>,
    fail_move: Mutex<Option<RemoteError>>,
    fail_delete: Mutex<Option<RemoteError>>,
    stall_transfers: AtomicBool,
    counter: AtomicUsize,
}

impl ScriptedRemote {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Replaces the remote tree served by `list`
    pub fn set_tree(&self, entries: Vec<RemoteEntry>) {
        *self.tree.lock().unwrap() = entries;
    }

    pub fn fail_upload(&self, err: RemoteError) {
        *self.fail_upload.lock().unwrap() = Some(err);
    }

    pub fn fail_download(&self, err: RemoteError) {
        *self.fail_download.lock().unwrap() = Some(err);
    }

    pub fn fail_move(&self, err: RemoteError) {
        *self.fail_move.lock().unwrap() = Some(err);
    }

    pub fn fail_delete(&self, err: RemoteError) {
        *self.fail_delete.lock().unwrap() = Some(err);
    }

    /// Uploads and downloads report a task handle and then wait until
    /// [`ScriptedRemote::resume_transfers`] is called
    pub fn stall_transfers(&self) {
        self.stall_transfers.store(true, Ordering::SeqCst);
    }

    pub fn resume_transfers(&self) {
        self.stall_transfers.store(false, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn maybe_stall(&self, observer: &dyn TransferObserver) {
        let n = self.next();
        observer.on_task(TransferHandle::new(format!("task-{}", n)));
        observer.on_progress(0, 10);
        while self.stall_transfers.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

#[async_trait::async_trait]
impl IRemoteClient for ScriptedRemote {
    async fn move_item(
        &self,
        src: &RemotePath,
        dst: &RemotePath,
        _overwrite: bool,
    ) -> Result<(), RemoteError> {
        self.record(Call::Move(src.to_string(), dst.to_string()));
        match self.fail_move.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn create_directory(&self, path: &RemotePath) -> Result<RemoteEntry, RemoteError> {
        self.record(Call::CreateDirectory(path.to_string()));
        let n = self.next();
        Ok(RemoteEntry {
            id: ItemId::new(format!("dir-{}", n)).unwrap(),
            path: path.clone(),
            etag: format!("DE{}", n),
            size: 0,
            modified: Utc::now(),
            content_type: None,
            is_directory: true,
        })
    }

    async fn upload(
        &self,
        path: &RemotePath,
        _local_file: Option<&Path>,
        _overwrite: bool,
        observer: &dyn TransferObserver,
    ) -> Result<UploadOutcome, RemoteError> {
        self.record(Call::Upload(path.to_string()));
        self.maybe_stall(observer).await;
        if let Some(err) = self.fail_upload.lock().unwrap().clone() {
            return Err(err);
        }
        let n = self.next();
        observer.on_progress(10, 10);
        Ok(UploadOutcome {
            id: ItemId::new(format!("up-{}", n)).unwrap(),
            etag: format!("UE{}", n),
            modified: Utc::now(),
            size: 10,
        })
    }

    async fn download(
        &self,
        path: &RemotePath,
        observer: &dyn TransferObserver,
    ) -> Result<DownloadOutcome, RemoteError> {
        self.record(Call::Download(path.to_string()));
        self.maybe_stall(observer).await;
        if let Some(err) = self.fail_download.lock().unwrap().clone() {
            return Err(err);
        }
        let n = self.next();
        Ok(DownloadOutcome {
            local_file: PathBuf::from(format!("/scratch/download-{}", n)),
            etag: format!("DL{}", n),
            size: 42,
            modified: Utc::now(),
        })
    }

    async fn delete(&self, path: &RemotePath) -> Result<(), RemoteError> {
        self.record(Call::Delete(path.to_string()));
        match self.fail_delete.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn list(
        &self,
        path: &RemotePath,
        depth: ListDepth,
    ) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.record(Call::List(path.to_string(), depth));
        let tree = self.tree.lock().unwrap();
        Ok(tree
            .iter()
            .filter(|entry| match depth {
                ListDepth::Children => entry.path.parent().as_ref() == Some(path),
                ListDepth::Infinite => entry.path.is_descendant_of(path),
            })
            .cloned()
            .collect())
    }
}

// ============================================================================
// RecordingSink
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(SyncEvent::kind).collect()
    }
}

impl ISyncEventSink for RecordingSink {
    fn emit(&self, event: SyncEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn id(s: &str) -> ItemId {
    ItemId::new(s).unwrap()
}

pub fn path(p: &str) -> RemotePath {
    RemotePath::new(p).unwrap()
}

pub fn dir(id_str: &str, p: &str) -> ItemRecord {
    ItemRecord::at_path(id(id_str), &path(p), true)
        .unwrap()
        .with_etag(format!("etag-{}", id_str))
        .with_modified(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
}

pub fn file(id_str: &str, p: &str) -> ItemRecord {
    ItemRecord::at_path(id(id_str), &path(p), false)
        .unwrap()
        .with_etag(format!("etag-{}", id_str))
        .with_size(5)
        .with_modified(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
}

/// Remote entry mirroring a record, optionally at another path
pub fn entry(record: &ItemRecord, at: Option<&str>) -> RemoteEntry {
    RemoteEntry {
        id: record.id().clone(),
        path: at.map(path).unwrap_or_else(|| record.path()),
        etag: record.etag().to_string(),
        size: record.size(),
        modified: record.modified(),
        content_type: None,
        is_directory: record.is_directory(),
    }
}

/// `/docs(d1)`, `/docs/report.txt(f1)`, `/docs/sub(d2)`, `/docs/sub/b.txt(f2)`, `/other(d3)`
pub fn seed_tree() -> Vec<ItemRecord> {
    vec![
        dir("d1", "/docs"),
        file("f1", "/docs/report.txt"),
        dir("d2", "/docs/sub"),
        file("f2", "/docs/sub/b.txt"),
        dir("d3", "/other"),
    ]
}

pub struct Harness {
    pub engine: SyncEngine,
    pub store: Arc<SqliteMetadataStore>,
    pub remote: Arc<ScriptedRemote>,
    pub signaler: Arc<BroadcastSignaler>,
    pub signals: broadcast::Receiver<ChangeSignal>,
    pub sink: Arc<RecordingSink>,
    _pool: DatabasePool,
}

impl Harness {
    pub async fn new(mode: EnumerationMode, page_size: usize) -> Self {
        let pool = DatabasePool::in_memory().await.unwrap();
        let store = Arc::new(SqliteMetadataStore::new(pool.pool().clone()));
        let remote = Arc::new(ScriptedRemote::default());
        let signaler = Arc::new(BroadcastSignaler::default());
        let signals = signaler.subscribe();
        let sink = Arc::new(RecordingSink::default());

        let engine = SyncEngine::new(
            EngineSettings::new("test")
                .with_mode(mode)
                .with_page_size(page_size),
            remote.clone(),
            store.clone(),
            signaler.clone(),
            Some(sink.clone() as Arc<dyn ISyncEventSink>),
        );
        engine
            .set_account(Some(Account::new("alice", "https://cloud.example", "test")))
            .await;

        Self {
            engine,
            store,
            remote,
            signaler,
            signals,
            sink,
            _pool: pool,
        }
    }

    /// Fast-mode harness with the standard tree in store and remote
    pub async fn seeded() -> Self {
        let harness = Self::new(EnumerationMode::Fast, 100).await;
        harness.seed(&seed_tree()).await;
        harness
    }

    pub async fn seed(&self, records: &[ItemRecord]) {
        for record in records {
            self.store.upsert(record).await.unwrap();
        }
        self.remote
            .set_tree(records.iter().map(|record| entry(record, None)).collect());
    }

    pub async fn record(&self, id_str: &str) -> Option<ItemRecord> {
        self.store.get(&id(id_str)).await.unwrap()
    }

    /// Drains every signal delivered so far
    pub fn drain_signals(&mut self) -> Vec<ChangeSignal> {
        let mut out = Vec::new();
        while let Ok(signal) = self.signals.try_recv() {
            out.push(signal);
        }
        out
    }
}

/// A local content file for uploads
pub fn content_file(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let file = dir.path().join(name);
    std::fs::write(&file, body).unwrap();
    file
}
