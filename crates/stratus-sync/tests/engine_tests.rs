//! Integration tests for SyncEngine against a scripted remote

mod common;

use std::time::Duration;

use common::{content_file, dir, entry, file, id, path, Call, Harness};
use stratus_core::config::EnumerationMode;
use stratus_core::domain::{
    ChangedFields, ItemField, ItemStatus, ItemTemplate, RemoteError, SyncError, TransferKind,
};
use stratus_core::ports::{ChangeReason, IMetadataStore, IProjectionHost, ListDepth, SyncEvent};
use tempfile::TempDir;

fn rename(item: &stratus_core::domain::ProjectedItem, name: &str) -> stratus_core::domain::ProjectedItem {
    let mut item = item.clone();
    item.filename = name.to_string();
    item
}

async fn wait_for_handle(h: &Harness, id_str: &str) {
    let mut waited = 0;
    while h.record(id_str).await.unwrap().transfer_handle().is_none() {
        assert!(waited < 200, "transfer never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
}

// ============================================================================
// Identity and structure
// ============================================================================

#[tokio::test]
async fn test_rename_keeps_identifier() {
    let h = Harness::seeded().await;
    let item = h.engine.item_for(&id("f1")).await.unwrap();

    let renamed = h
        .engine
        .modify_item(
            &rename(&item, "summary.txt"),
            &ChangedFields::of(&[ItemField::Filename]),
            None,
        )
        .await
        .unwrap();

    assert_eq!(renamed.identifier, id("f1"));
    assert_eq!(renamed.filename, "summary.txt");
    assert_eq!(renamed.parent_identifier, id("d1"));
    assert_eq!(h.record("f1").await.unwrap().path(), path("/docs/summary.txt"));
    assert_eq!(
        h.remote.calls(),
        vec![Call::Move("/docs/report.txt".into(), "/docs/summary.txt".into())]
    );
    assert_eq!(h.sink.kinds(), vec!["item_modified"]);
}

#[tokio::test]
async fn test_reparent_moves_under_new_directory() {
    let h = Harness::seeded().await;
    let mut item = h.engine.item_for(&id("f1")).await.unwrap();
    item.parent_identifier = id("d3");

    let moved = h
        .engine
        .modify_item(&item, &ChangedFields::of(&[ItemField::ParentIdentifier]), None)
        .await
        .unwrap();

    assert_eq!(moved.parent_identifier, id("d3"));
    assert_eq!(h.record("f1").await.unwrap().path(), path("/other/report.txt"));
}

#[tokio::test]
async fn test_directory_rename_cascades_to_descendants() {
    let mut h = Harness::seeded().await;
    let item = h.engine.item_for(&id("d1")).await.unwrap();

    h.engine
        .modify_item(
            &rename(&item, "archive"),
            &ChangedFields::of(&[ItemField::Filename]),
            None,
        )
        .await
        .unwrap();

    assert_eq!(h.record("f1").await.unwrap().path(), path("/archive/report.txt"));
    assert_eq!(h.record("f2").await.unwrap().path(), path("/archive/sub/b.txt"));
    assert_eq!(h.record("d2").await.unwrap().path(), path("/archive/sub"));
    assert!(h.store.get_by_path(&path("/docs/report.txt")).await.unwrap().is_none());

    let reasons: Vec<ChangeReason> = h.drain_signals().into_iter().map(|s| s.reason).collect();
    assert_eq!(reasons, vec![ChangeReason::DirectoryMoved { id: id("d1") }]);
}

#[tokio::test]
async fn test_rename_onto_occupied_name_keeps_paths_unique() {
    let h = Harness::seeded().await;
    h.seed(&[file("f9", "/docs/taken.txt")]).await;
    let item = h.engine.item_for(&id("f1")).await.unwrap();

    h.engine
        .modify_item(
            &rename(&item, "taken.txt"),
            &ChangedFields::of(&[ItemField::Filename]),
            None,
        )
        .await
        .unwrap();

    let occupant = h.store.get_by_path(&path("/docs/taken.txt")).await.unwrap().unwrap();
    assert_eq!(occupant.id(), &id("f1"));
    assert!(h.record("f9").await.is_none());
}

#[tokio::test]
async fn test_failed_move_leaves_store_untouched() {
    let h = Harness::seeded().await;
    h.remote.fail_move(RemoteError::failed(412, "target exists"));
    let tmp = TempDir::new().unwrap();
    let contents = content_file(&tmp, "body", "new body");
    let item = h.engine.item_for(&id("f1")).await.unwrap();

    let err = h
        .engine
        .modify_item(
            &rename(&item, "notes.txt"),
            &ChangedFields::of(&[ItemField::Filename, ItemField::Contents]),
            Some(&contents),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::RemoteOperationFailed { code: 412, .. }));
    let record = h.record("f1").await.unwrap();
    assert_eq!(record.path(), path("/docs/report.txt"));
    assert_eq!(record.status(), ItemStatus::Normal);
    assert!(
        !h.remote.calls().iter().any(|c| matches!(c, Call::Upload(_))),
        "no upload after a failed move"
    );
    assert_eq!(h.sink.kinds(), vec!["item_failed"]);
}

// ============================================================================
// Modify: ordering and partial failure
// ============================================================================

#[tokio::test]
async fn test_rename_and_content_change_moves_before_upload() {
    let h = Harness::seeded().await;
    let tmp = TempDir::new().unwrap();
    let contents = content_file(&tmp, "body", "fresh notes");
    let item = h.engine.item_for(&id("f1")).await.unwrap();

    let result = h
        .engine
        .modify_item(
            &rename(&item, "notes.txt"),
            &ChangedFields::of(&[ItemField::Filename, ItemField::Contents]),
            Some(&contents),
        )
        .await
        .unwrap();

    assert_eq!(
        h.remote.calls(),
        vec![
            Call::Move("/docs/report.txt".into(), "/docs/notes.txt".into()),
            Call::Upload("/docs/notes.txt".into()),
        ]
    );
    let record = h.record("f1").await.unwrap();
    assert_eq!(record.path(), path("/docs/notes.txt"));
    assert_eq!(record.status(), ItemStatus::Normal);
    assert!(record.etag().starts_with("UE"));
    assert!(record.transfer_handle().is_none());
    assert_eq!(result.identifier, id("f1"));
    assert_eq!(result.item_version, record.etag());
    assert!(result.is_uploaded);
}

#[tokio::test]
async fn test_upload_failure_after_rename_keeps_new_path() {
    let h = Harness::seeded().await;
    h.remote.fail_upload(RemoteError::failed(507, "quota exceeded"));
    let tmp = TempDir::new().unwrap();
    let contents = content_file(&tmp, "body", "too big");
    let item = h.engine.item_for(&id("f1")).await.unwrap();

    let err = h
        .engine
        .modify_item(
            &rename(&item, "notes.txt"),
            &ChangedFields::of(&[ItemField::Filename, ItemField::Contents]),
            Some(&contents),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::RemoteOperationFailed { code: 507, .. }));
    let record = h.record("f1").await.unwrap();
    assert_eq!(record.path(), path("/docs/notes.txt"), "rename is not reverted");
    assert_eq!(record.status(), ItemStatus::UploadError);
    assert!(record.session_error().unwrap().contains("quota exceeded"));
    assert!(record.transfer_handle().is_none());
    assert_eq!(record.etag(), "etag-f1", "version is unchanged");

    let projected = h.engine.item_for(&id("f1")).await.unwrap();
    assert!(!projected.is_uploaded);
    assert!(projected.upload_error.unwrap().contains("quota exceeded"));

    match h.sink.events().last().unwrap() {
        SyncEvent::ItemFailed { id: failed, operation, code, .. } => {
            assert_eq!(failed.as_ref(), Some(&id("f1")));
            assert_eq!(operation, "modify");
            assert_eq!(code, "remote_operation_failed");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_content_change_after_queued_directory_move_uses_new_path() {
    let h = Harness::seeded().await;
    let tmp = TempDir::new().unwrap();
    let contents = content_file(&tmp, "body", "b2");
    let docs = h.engine.item_for(&id("d1")).await.unwrap();
    let nested = h.engine.item_for(&id("f2")).await.unwrap();
    let rename_fields = ChangedFields::of(&[ItemField::Filename]);
    let content_fields = ChangedFields::of(&[ItemField::Contents]);
    let renamed_docs = rename(&docs, "archive");

    let (moved, written) = tokio::join!(
        h.engine.modify_item(&renamed_docs, &rename_fields, None),
        h.engine.modify_item(&nested, &content_fields, Some(&contents)),
    );
    moved.unwrap();
    written.unwrap();

    assert_eq!(
        h.remote.calls(),
        vec![
            Call::Move("/docs".into(), "/archive".into()),
            Call::Upload("/archive/sub/b.txt".into()),
        ]
    );
}

#[tokio::test]
async fn test_modify_without_relevant_changes_is_a_noop() {
    let h = Harness::seeded().await;
    let item = h.engine.item_for(&id("f1")).await.unwrap();
    let metadata_only = ChangedFields::of(&[
        ItemField::ContentModificationDate,
        ItemField::TagData,
        ItemField::FavoriteRank,
    ]);

    let returned = h.engine.modify_item(&item, &metadata_only, None).await.unwrap();
    assert_eq!(returned, item);

    let directory = h.engine.item_for(&id("d1")).await.unwrap();
    let returned = h
        .engine
        .modify_item(&directory, &ChangedFields::of(&[ItemField::Contents]), None)
        .await
        .unwrap();
    assert_eq!(returned, directory);

    assert!(h.remote.calls().is_empty());
    assert!(h.sink.events().is_empty());
}

#[tokio::test]
async fn test_content_change_without_contents_is_rejected() {
    let h = Harness::seeded().await;
    let item = h.engine.item_for(&id("f1")).await.unwrap();

    let err = h
        .engine
        .modify_item(&item, &ChangedFields::of(&[ItemField::Contents]), None)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NoSuchItem(_)));
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn test_modify_unknown_item() {
    let h = Harness::seeded().await;
    let mut item = h.engine.item_for(&id("f1")).await.unwrap();
    item.identifier = id("ghost");

    let err = h
        .engine
        .modify_item(&rename(&item, "x.txt"), &ChangedFields::of(&[ItemField::Filename]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NoSuchItem(_)));
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_directory_and_file() {
    let h = Harness::seeded().await;
    let tmp = TempDir::new().unwrap();
    let contents = content_file(&tmp, "body", "hello");

    let created_dir = h
        .engine
        .create_item(&ItemTemplate::directory(id("d1"), "photos"), None)
        .await
        .unwrap();
    assert!(created_dir.is_directory());
    assert_eq!(created_dir.parent_identifier, id("d1"));
    let stored = h.store.get(&created_dir.identifier).await.unwrap().unwrap();
    assert_eq!(stored.path(), path("/docs/photos"));

    let template = ItemTemplate::file(created_dir.identifier.clone(), "cat.png")
        .with_content_type("image/png");
    let created_file = h.engine.create_item(&template, Some(&contents)).await.unwrap();
    assert_eq!(created_file.content_type, "image/png");
    assert_eq!(created_file.parent_identifier, created_dir.identifier);
    assert!(created_file.identifier.as_str().starts_with("up-"));

    let record = h.store.get(&created_file.identifier).await.unwrap().unwrap();
    assert_eq!(record.path(), path("/docs/photos/cat.png"));
    assert_eq!(record.status(), ItemStatus::Normal);

    assert_eq!(
        h.remote.calls(),
        vec![
            Call::CreateDirectory("/docs/photos".into()),
            Call::Upload("/docs/photos/cat.png".into()),
        ]
    );
    assert_eq!(h.sink.kinds(), vec!["item_created", "item_created"]);
    assert_eq!(h.engine.transfers().active_count(), 0);
}

#[tokio::test]
async fn test_create_under_unknown_parent() {
    let h = Harness::seeded().await;
    let err = h
        .engine
        .create_item(&ItemTemplate::file(id("missing"), "a.txt"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NoSuchItem(_)));
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn test_create_with_taken_name_is_refused() {
    let h = Harness::seeded().await;
    let tmp = TempDir::new().unwrap();
    let contents = content_file(&tmp, "body", "replacement");

    let err = h
        .engine
        .create_item(&ItemTemplate::file(id("d1"), "report.txt"), Some(&contents))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::RemoteOperationFailed { code: 412, .. }));
    assert!(h.remote.calls().is_empty());
    let record = h.record("f1").await.unwrap();
    assert_eq!(record.etag(), "etag-f1");
    assert_eq!(record.status(), ItemStatus::Normal);
    assert_eq!(h.store.children_of(&path("/docs")).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_create_persists_nothing() {
    let h = Harness::seeded().await;
    h.remote.fail_upload(RemoteError::failed(500, "backend down"));
    let template = ItemTemplate::file(id("d1"), "new.txt");

    let err = h.engine.create_item(&template, None).await.unwrap_err();

    assert!(matches!(err, SyncError::RemoteOperationFailed { code: 500, .. }));
    assert!(h.store.get_by_path(&path("/docs/new.txt")).await.unwrap().is_none());
    assert_eq!(h.store.children_of(&path("/docs")).await.unwrap().len(), 2);
    assert_eq!(template.filename, "new.txt");
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_unknown_item() {
    let h = Harness::seeded().await;
    let err = h.engine.delete_item(&id("nope")).await.unwrap_err();
    assert!(matches!(err, SyncError::NoSuchItem(_)));
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn test_delete_directory_removes_subtree() {
    let mut h = Harness::seeded().await;

    h.engine.delete_item(&id("d1")).await.unwrap();

    assert_eq!(h.remote.calls(), vec![Call::Delete("/docs".into())]);
    for gone in ["d1", "f1", "d2", "f2"] {
        assert!(h.record(gone).await.is_none(), "{} should be gone", gone);
    }
    assert!(h.record("d3").await.is_some());
    let reasons: Vec<ChangeReason> = h.drain_signals().into_iter().map(|s| s.reason).collect();
    assert_eq!(reasons, vec![ChangeReason::DirectoryDeleted { id: id("d1") }]);
    assert_eq!(h.sink.kinds(), vec!["item_deleted"]);
}

#[tokio::test]
async fn test_remote_delete_failure_keeps_record() {
    let h = Harness::seeded().await;
    h.remote.fail_delete(RemoteError::failed(423, "locked"));

    let err = h.engine.delete_item(&id("f1")).await.unwrap_err();

    assert!(matches!(err, SyncError::RemoteOperationFailed { code: 423, .. }));
    assert!(h.record("f1").await.is_some());
}

// ============================================================================
// Fetch contents
// ============================================================================

#[tokio::test]
async fn test_fetch_refreshes_version() {
    let h = Harness::seeded().await;

    let fetched = h.engine.fetch_contents(&id("f1"), None).await.unwrap();

    assert!(fetched.path.to_string_lossy().contains("download"));
    let record = h.record("f1").await.unwrap();
    assert!(record.etag().starts_with("DL"));
    assert_eq!(record.size(), 42);
    assert_eq!(record.status(), ItemStatus::Normal);
    assert_eq!(fetched.item.item_version, record.etag());
    assert_eq!(h.remote.calls(), vec![Call::Download("/docs/report.txt".into())]);
}

#[tokio::test]
async fn test_fetch_of_specific_version_is_unsupported() {
    let h = Harness::seeded().await;
    let err = h.engine.fetch_contents(&id("f1"), Some("v1")).await.unwrap_err();
    assert!(matches!(err, SyncError::FeatureUnsupported(_)));

    let err = h.engine.fetch_contents(&id("d1"), None).await.unwrap_err();
    assert!(matches!(err, SyncError::FeatureUnsupported(_)));
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_records_download_error() {
    let h = Harness::seeded().await;
    h.remote.fail_download(RemoteError::NotFound("/docs/report.txt".into()));

    let err = h.engine.fetch_contents(&id("f1"), None).await.unwrap_err();

    assert!(matches!(err, SyncError::NoSuchItem(_)));
    let record = h.record("f1").await.unwrap();
    assert_eq!(record.status(), ItemStatus::DownloadError);
    let projected = h.engine.item_for(&id("f1")).await.unwrap();
    assert!(!projected.is_downloaded);
    assert!(projected.download_error.is_some());
}

// ============================================================================
// Transfers
// ============================================================================

#[tokio::test]
async fn test_cancel_running_upload() {
    let h = Harness::seeded().await;
    h.remote.stall_transfers();
    let tmp = TempDir::new().unwrap();
    let contents = content_file(&tmp, "body", "slow");
    let item = h.engine.item_for(&id("f1")).await.unwrap();

    let engine = h.engine.clone();
    let task = tokio::spawn(async move {
        engine
            .modify_item(&item, &ChangedFields::of(&[ItemField::Contents]), Some(&contents))
            .await
    });

    wait_for_handle(&h, "f1").await;
    assert!(h.engine.transfers().is_active(&id("f1")));
    assert_eq!(h.record("f1").await.unwrap().status(), ItemStatus::Uploading);

    assert!(h.engine.cancel_transfer(&id("f1")).await);
    let result = task.await.unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled)));

    let record = h.record("f1").await.unwrap();
    assert_eq!(record.status(), ItemStatus::UploadError);
    assert_eq!(record.session_error(), Some("cancelled"));
    assert!(record.transfer_handle().is_none());
    assert!(!h.engine.transfers().is_active(&id("f1")));
    assert!(h.sink.events().contains(&SyncEvent::TransferCancelled {
        id: id("f1"),
        kind: TransferKind::Upload,
    }));

    assert!(!h.engine.cancel_transfer(&id("f1")).await);
}

#[tokio::test]
async fn test_fetch_waits_for_running_upload() {
    let h = Harness::seeded().await;
    h.remote.stall_transfers();
    let tmp = TempDir::new().unwrap();
    let contents = content_file(&tmp, "body", "new body");
    let item = h.engine.item_for(&id("f1")).await.unwrap();

    let engine = h.engine.clone();
    let upload = tokio::spawn(async move {
        engine
            .modify_item(&item, &ChangedFields::of(&[ItemField::Contents]), Some(&contents))
            .await
    });
    wait_for_handle(&h, "f1").await;

    let engine = h.engine.clone();
    let fetch = tokio::spawn(async move { engine.fetch_contents(&id("f1"), None).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The fetch is queued, the upload keeps running
    assert!(!fetch.is_finished());
    assert_eq!(h.engine.transfers().kind_of(&id("f1")), Some(TransferKind::Upload));
    assert_eq!(h.record("f1").await.unwrap().status(), ItemStatus::Uploading);
    assert_eq!(h.remote.calls(), vec![Call::Upload("/docs/report.txt".into())]);

    h.remote.resume_transfers();
    let modified = upload.await.unwrap().unwrap();
    assert!(modified.item_version.starts_with("UE"));

    let fetched = fetch.await.unwrap().unwrap();
    assert!(fetched.item.item_version.starts_with("DL"));
    assert_eq!(
        h.remote.calls(),
        vec![
            Call::Upload("/docs/report.txt".into()),
            Call::Download("/docs/report.txt".into()),
        ]
    );
    let record = h.record("f1").await.unwrap();
    assert_eq!(record.status(), ItemStatus::Normal);
    assert!(record.session_error().is_none());
}

#[tokio::test]
async fn test_discarded_upload_records_upload_error() {
    let h = Harness::seeded().await;
    h.remote.stall_transfers();
    let tmp = TempDir::new().unwrap();
    let contents = content_file(&tmp, "body", "lost");
    let item = h.engine.item_for(&id("f1")).await.unwrap();

    let engine = h.engine.clone();
    let task = tokio::spawn(async move {
        engine
            .modify_item(&item, &ChangedFields::of(&[ItemField::Contents]), Some(&contents))
            .await
    });
    wait_for_handle(&h, "f1").await;

    h.engine.transfers().discard(&id("f1"));
    assert!(matches!(task.await.unwrap(), Err(SyncError::Cancelled)));

    let record = h.record("f1").await.unwrap();
    assert_eq!(record.status(), ItemStatus::UploadError);
    assert_eq!(record.session_error(), Some("cancelled"));
    assert!(record.transfer_handle().is_none());
}

#[tokio::test]
async fn test_recover_interrupted_transfers() {
    let h = Harness::new(EnumerationMode::Fast, 100).await;
    h.seed(&[
        file("f1", "/a.txt").with_status(ItemStatus::Downloading, None)
            .with_transfer_handle(Some(stratus_core::domain::TransferHandle::new("task-7"))),
        file("f2", "/b.txt"),
    ])
    .await;

    assert_eq!(h.engine.recover_interrupted().await.unwrap(), 1);

    let record = h.record("f1").await.unwrap();
    assert_eq!(record.status(), ItemStatus::DownloadError);
    assert_eq!(record.session_error(), Some("transfer interrupted"));
    assert_eq!(record.transfer_handle().unwrap().as_str(), "task-7");
    assert_eq!(h.record("f2").await.unwrap().status(), ItemStatus::Normal);
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_operations_require_account() {
    let h = Harness::seeded().await;
    h.engine.set_account(None).await;
    let item = h.engine.item_for(&id("f1")).await.unwrap();

    assert!(matches!(
        h.engine.create_item(&ItemTemplate::file(id("d1"), "x"), None).await,
        Err(SyncError::NotAuthenticated)
    ));
    assert!(matches!(
        h.engine
            .modify_item(&rename(&item, "y"), &ChangedFields::of(&[ItemField::Filename]), None)
            .await,
        Err(SyncError::NotAuthenticated)
    ));
    assert!(matches!(
        h.engine.delete_item(&id("f1")).await,
        Err(SyncError::NotAuthenticated)
    ));
    assert!(matches!(
        h.engine.fetch_contents(&id("f1"), None).await,
        Err(SyncError::NotAuthenticated)
    ));
    assert!(matches!(
        h.engine.enumerate(&stratus_core::domain::ItemId::root(), None).await,
        Err(SyncError::NotAuthenticated)
    ));
    assert!(h.remote.calls().is_empty());
}

// ============================================================================
// Enumeration
// ============================================================================

#[tokio::test]
async fn test_enumerate_root_pages_through_children() {
    let h = Harness::new(EnumerationMode::Fast, 2).await;
    let records = vec![
        dir("d1", "/a"),
        file("f1", "/b.txt"),
        file("f2", "/c.txt"),
        file("f3", "/a/nested.txt"),
    ];
    h.remote
        .set_tree(records.iter().map(|r| entry(r, None)).collect());

    let root = stratus_core::domain::ItemId::root();
    let first = h.engine.enumerate(&root, None).await.unwrap();
    assert_eq!(first.items.len(), 2);
    let token = first.next_page.clone().expect("more pages");

    let second = h.engine.enumerate(&root, Some(&token)).await.unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.next_page.is_none());

    let mut names: Vec<String> = first
        .items
        .iter()
        .chain(second.items.iter())
        .map(|item| item.filename.clone())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a", "b.txt", "c.txt"]);
    assert!(h.record("f3").await.is_none(), "fast mode lists one level");

    assert_eq!(
        h.remote.calls(),
        vec![Call::List("/".into(), ListDepth::Children)],
        "later pages are served from the store"
    );
    match h.sink.events().last().unwrap() {
        SyncEvent::EnumerationFinished { added, .. } => assert_eq!(*added, 3),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_enumerate_rejects_malformed_token() {
    let h = Harness::seeded().await;
    let bad = stratus_core::ports::PageToken::new("not a token");
    let err = h.engine.enumerate(&id("d1"), Some(&bad)).await.unwrap_err();
    assert!(matches!(err, SyncError::NoSuchItem(_)));
}

#[tokio::test]
async fn test_enumerate_unknown_container() {
    let h = Harness::seeded().await;
    let err = h.engine.enumerate(&id("f1"), None).await.unwrap_err();
    assert!(matches!(err, SyncError::NoSuchItem(_)));
}

#[tokio::test]
async fn test_fast_mode_sees_move_as_delete_then_add() {
    let mut h = Harness::seeded().await;
    let moved = file("f1", "/docs/report.txt");
    h.remote.set_tree(vec![
        entry(&dir("d1", "/docs"), None),
        entry(&dir("d2", "/docs/sub"), None),
        entry(&file("f2", "/docs/sub/b.txt"), None),
        entry(&dir("d3", "/other"), None),
        entry(&moved, Some("/other/report.txt")),
    ]);

    h.engine.enumerate(&id("d1"), None).await.unwrap();
    assert!(h.record("f1").await.is_none(), "old parent reports a deletion");

    h.engine.enumerate(&id("d3"), None).await.unwrap();
    assert_eq!(h.record("f1").await.unwrap().path(), path("/other/report.txt"));

    let finished: Vec<(usize, usize, usize)> = h
        .sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::EnumerationFinished { added, moved, deleted, .. } => {
                Some((added, moved, deleted))
            }
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![(0, 0, 1), (1, 0, 0)]);

    let merged = h
        .drain_signals()
        .into_iter()
        .filter(|s| matches!(s.reason, ChangeReason::EnumerationMerged { .. }))
        .count();
    assert_eq!(merged, 2);
}

#[tokio::test]
async fn test_full_mode_detects_moves() {
    let h = Harness::new(EnumerationMode::Full, 100).await;
    let records = common::seed_tree();
    h.seed(&records).await;
    h.remote.set_tree(vec![
        entry(&records[0], None),
        entry(&records[2], None),
        entry(&records[3], None),
        entry(&records[4], None),
        entry(&records[1], Some("/other/report.txt")),
    ]);

    let page = h
        .engine
        .enumerate(&stratus_core::domain::ItemId::root(), None)
        .await
        .unwrap();

    assert_eq!(page.items.len(), 5);
    assert_eq!(h.record("f1").await.unwrap().path(), path("/other/report.txt"));
    match h.sink.events().last().unwrap() {
        SyncEvent::EnumerationFinished { added, moved, deleted, .. } => {
            assert_eq!((*added, *moved, *deleted), (0, 1, 0));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_unchanged_enumeration_does_not_signal() {
    let mut h = Harness::seeded().await;
    h.engine.enumerate(&id("d1"), None).await.unwrap();
    assert!(h.drain_signals().is_empty());
}

#[tokio::test]
async fn test_materialized_items_changed_signals_working_set() {
    let mut h = Harness::seeded().await;
    h.engine.materialized_items_changed();
    let reasons: Vec<ChangeReason> = h.drain_signals().into_iter().map(|s| s.reason).collect();
    assert_eq!(reasons, vec![ChangeReason::MaterializedItemsChanged]);
}

// ============================================================================
// Host port
// ============================================================================

#[tokio::test]
async fn test_engine_serves_as_projection_host() {
    let h = Harness::seeded().await;
    let host: std::sync::Arc<dyn IProjectionHost> = std::sync::Arc::new(h.engine.clone());

    let root = host
        .item_for(&stratus_core::domain::ItemId::root())
        .await
        .unwrap();
    assert!(root.is_directory());

    host.delete_item(&id("f1")).await.unwrap();
    assert!(matches!(
        host.item_for(&id("f1")).await,
        Err(SyncError::NoSuchItem(_))
    ));
}

#[tokio::test]
async fn test_shutdown_rejects_new_operations() {
    let h = Harness::seeded().await;
    h.engine.shutdown().await;
    let err = h.engine.delete_item(&id("f1")).await.unwrap_err();
    assert!(matches!(err, SyncError::Storage(_)));
    assert!(h.record("f1").await.is_some());
}
