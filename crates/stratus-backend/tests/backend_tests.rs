//! Integration tests for DirectoryBackend on a temporary directory

use std::sync::Mutex;

use tokio::sync::oneshot;

use stratus_backend::DirectoryBackend;
use stratus_core::domain::{RemoteError, RemotePath, TransferHandle};
use stratus_core::ports::{IRemoteClient, ListDepth, NoopObserver, TransferObserver};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingObserver {
    progress: Mutex<Vec<(u64, u64)>>,
    handles: Mutex<Vec<TransferHandle>>,
}

impl TransferObserver for RecordingObserver {
    fn on_progress(&self, completed: u64, total: u64) {
        self.progress.lock().unwrap().push((completed, total));
    }

    fn on_task(&self, handle: TransferHandle) {
        self.handles.lock().unwrap().push(handle);
    }
}

/// Signals the first progress report
struct FirstProgress(Mutex<Option<oneshot::Sender<()>>>);

impl TransferObserver for FirstProgress {
    fn on_progress(&self, _completed: u64, _total: u64) {
        if let Some(tx) = self.0.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }

    fn on_task(&self, _handle: TransferHandle) {}
}

fn staging_files(root: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.unwrap().file_name().into_string().ok())
        .filter(|name| name.starts_with(".stratus-upload-"))
        .collect()
}

fn path(p: &str) -> RemotePath {
    RemotePath::new(p).unwrap()
}

async fn setup() -> (TempDir, DirectoryBackend) {
    let dir = TempDir::new().unwrap();
    let backend = DirectoryBackend::open(dir.path().join("remote"), dir.path().join("scratch"))
        .await
        .unwrap();
    (dir, backend)
}

async fn write_source(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
    let file = dir.path().join(name);
    tokio::fs::write(&file, content).await.unwrap();
    file
}

#[tokio::test]
async fn test_create_upload_and_list() {
    let (dir, backend) = setup().await;
    let docs = backend.create_directory(&path("/docs")).await.unwrap();
    assert!(docs.is_directory);

    let src = write_source(&dir, "a.txt", b"hello").await;
    let uploaded = backend
        .upload(&path("/docs/a.txt"), Some(&src), false, &NoopObserver)
        .await
        .unwrap();
    assert_eq!(uploaded.size, 5);

    let top = backend.list(&RemotePath::root(), ListDepth::Children).await.unwrap();
    assert_eq!(top.len(), 1, "index file must stay hidden");
    assert_eq!(top[0].id, docs.id);

    let all = backend.list(&RemotePath::root(), ListDepth::Infinite).await.unwrap();
    let paths: Vec<&str> = all.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/docs", "/docs/a.txt"]);
    assert_eq!(all[1].id, uploaded.id);
    assert_eq!(all[1].etag, uploaded.etag);
    assert_eq!(all[1].content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn test_upload_reports_handle_and_progress() {
    let (dir, backend) = setup().await;
    let content = vec![7u8; 150 * 1024];
    let src = write_source(&dir, "big.bin", &content).await;
    let observer = RecordingObserver::default();

    let outcome = backend
        .upload(&path("/big.bin"), Some(&src), false, &observer)
        .await
        .unwrap();

    assert_eq!(outcome.size, content.len() as u64);
    assert_eq!(observer.handles.lock().unwrap().len(), 1);
    let progress = observer.progress.lock().unwrap();
    assert!(progress.len() >= 3);
    assert_eq!(*progress.last().unwrap(), (content.len() as u64, content.len() as u64));
}

#[tokio::test]
async fn test_empty_upload_creates_empty_file() {
    let (_dir, backend) = setup().await;
    let outcome = backend
        .upload(&path("/empty.txt"), None, false, &NoopObserver)
        .await
        .unwrap();
    assert_eq!(outcome.size, 0);
    let meta = tokio::fs::metadata(backend.local_path(&path("/empty.txt")))
        .await
        .unwrap();
    assert_eq!(meta.len(), 0);
}

#[tokio::test]
async fn test_replacing_content_keeps_id_and_changes_etag() {
    let (dir, backend) = setup().await;
    let v1 = write_source(&dir, "v1", b"first").await;
    let v2 = write_source(&dir, "v2", b"second").await;

    let first = backend.upload(&path("/a.txt"), Some(&v1), false, &NoopObserver).await.unwrap();
    let second = backend.upload(&path("/a.txt"), Some(&v2), true, &NoopObserver).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_ne!(first.etag, second.etag);
}

#[tokio::test]
async fn test_download_matches_upload() {
    let (dir, backend) = setup().await;
    let src = write_source(&dir, "a.txt", b"payload").await;
    let uploaded = backend.upload(&path("/a.txt"), Some(&src), false, &NoopObserver).await.unwrap();

    let downloaded = backend.download(&path("/a.txt"), &NoopObserver).await.unwrap();

    assert_eq!(downloaded.etag, uploaded.etag);
    assert_eq!(downloaded.size, 7);
    assert!(downloaded.local_file.starts_with(backend.scratch_dir()));
    assert_eq!(tokio::fs::read(&downloaded.local_file).await.unwrap(), b"payload");
}

#[tokio::test]
async fn test_move_keeps_ids_of_subtree() {
    let (dir, backend) = setup().await;
    let docs = backend.create_directory(&path("/docs")).await.unwrap();
    let src = write_source(&dir, "b.txt", b"b").await;
    let file = backend.upload(&path("/docs/b.txt"), Some(&src), false, &NoopObserver).await.unwrap();

    backend
        .move_item(&path("/docs"), &path("/archive"), false)
        .await
        .unwrap();

    assert_eq!(backend.id_of(&path("/archive")).await, Some(docs.id));
    assert_eq!(backend.id_of(&path("/archive/b.txt")).await, Some(file.id));
    assert!(backend.id_of(&path("/docs")).await.is_none());
}

#[tokio::test]
async fn test_move_refuses_overwrite_unless_asked() {
    let (dir, backend) = setup().await;
    let a = write_source(&dir, "a", b"a").await;
    let b = write_source(&dir, "b", b"b").await;
    let moved = backend.upload(&path("/a.txt"), Some(&a), false, &NoopObserver).await.unwrap();
    backend.upload(&path("/b.txt"), Some(&b), false, &NoopObserver).await.unwrap();

    let err = backend
        .move_item(&path("/a.txt"), &path("/b.txt"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Failed { code: 412, .. }));

    backend
        .move_item(&path("/a.txt"), &path("/b.txt"), true)
        .await
        .unwrap();
    assert_eq!(backend.id_of(&path("/b.txt")).await, Some(moved.id));
}

#[tokio::test]
async fn test_missing_paths_are_not_found() {
    let (_dir, backend) = setup().await;
    assert!(matches!(
        backend.delete(&path("/nope")).await,
        Err(RemoteError::NotFound(_))
    ));
    assert!(matches!(
        backend.download(&path("/nope"), &NoopObserver).await,
        Err(RemoteError::NotFound(_))
    ));
    assert!(matches!(
        backend.move_item(&path("/nope"), &path("/x"), false).await,
        Err(RemoteError::NotFound(_))
    ));
    assert!(matches!(
        backend.create_directory(&path("/missing/child")).await,
        Err(RemoteError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_removes_tree() {
    let (dir, backend) = setup().await;
    backend.create_directory(&path("/docs")).await.unwrap();
    let src = write_source(&dir, "a.txt", b"a").await;
    backend.upload(&path("/docs/a.txt"), Some(&src), false, &NoopObserver).await.unwrap();

    backend.delete(&path("/docs")).await.unwrap();

    assert!(backend.list(&RemotePath::root(), ListDepth::Infinite).await.unwrap().is_empty());
    assert!(backend.id_of(&path("/docs/a.txt")).await.is_none());
}

#[tokio::test]
async fn test_ids_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("remote");
    let scratch = dir.path().join("scratch");

    let created = {
        let backend = DirectoryBackend::open(&root, &scratch).await.unwrap();
        backend.create_directory(&path("/docs")).await.unwrap()
    };

    let reopened = DirectoryBackend::open(&root, &scratch).await.unwrap();
    let listed = reopened.list(&RemotePath::root(), ListDepth::Children).await.unwrap();
    assert_eq!(listed[0].id, created.id);
}

#[tokio::test]
async fn test_external_files_get_ids_on_listing() {
    let (_dir, backend) = setup().await;
    tokio::fs::write(backend.local_path(&path("/outside.txt")), b"x")
        .await
        .unwrap();

    let first = backend.list(&RemotePath::root(), ListDepth::Children).await.unwrap();
    let second = backend.list(&RemotePath::root(), ListDepth::Children).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].id, second[0].id);
}

#[tokio::test]
async fn test_upload_refuses_existing_target_without_overwrite() {
    let (dir, backend) = setup().await;
    let v1 = write_source(&dir, "v1", b"original data").await;
    let v2 = write_source(&dir, "v2", b"CLOBBER").await;
    let first = backend.upload(&path("/a.txt"), Some(&v1), false, &NoopObserver).await.unwrap();

    let err = backend
        .upload(&path("/a.txt"), Some(&v2), false, &NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteError::Failed { code: 412, .. }));
    assert_eq!(
        tokio::fs::read(backend.local_path(&path("/a.txt"))).await.unwrap(),
        b"original data"
    );
    assert_eq!(backend.id_of(&path("/a.txt")).await, Some(first.id));
    assert!(staging_files(backend.root()).is_empty());
}

#[tokio::test]
async fn test_abandoned_upload_leaves_no_staging_file() {
    let (dir, backend) = setup().await;
    let src = write_source(&dir, "big.bin", &vec![7u8; 4 * 64 * 1024]).await;
    let (tx, rx) = oneshot::channel();
    let observer = FirstProgress(Mutex::new(Some(tx)));
    let big = path("/big.bin");

    tokio::select! {
        biased;
        _ = rx => {}
        result = backend.upload(&big, Some(&src), false, &observer) => {
            panic!("upload finished before it could be abandoned: {:?}", result.map(|o| o.size));
        }
    }

    assert!(staging_files(backend.root()).is_empty());
    assert!(!backend.local_path(&path("/big.bin")).exists());
}

#[tokio::test]
async fn test_open_sweeps_leftover_staging_files() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("remote");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join(".stratus-upload-1234-a.txt"), b"partial").unwrap();

    let backend = DirectoryBackend::open(&root, dir.path().join("scratch")).await.unwrap();

    assert!(staging_files(backend.root()).is_empty());
    assert!(backend.list(&RemotePath::root(), ListDepth::Children).await.unwrap().is_empty());
}
