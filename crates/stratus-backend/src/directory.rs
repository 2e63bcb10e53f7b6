//! DirectoryBackend - IRemoteClient implementation over a local directory
//!
//! Every remote path maps to the same relative path under the backend root.
//! Identifiers come from the [`SidecarIndex`]; versions are content digests.
//!
//! ## Design Notes
//!
//! - One `tokio::sync::Mutex` around the index serializes all operations, so
//!   the index and the directory tree never disagree.
//! - Uploads land in a `.stratus-upload-*` sibling and are renamed into
//!   place, so a reader never sees a half-written file. The sibling is
//!   removed when the upload fails or is dropped midway, and leftovers from
//!   a killed process are swept on open.
//! - Names starting with `.stratus-` are reserved and never listed.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use stratus_core::domain::{ItemId, RemoteError, RemotePath, TransferHandle};
use stratus_core::ports::{
    DownloadOutcome, IRemoteClient, ListDepth, RemoteEntry, TransferObserver, UploadOutcome,
};

use crate::index::{SidecarIndex, INDEX_FILE_NAME};
use crate::BackendError;

/// Bytes copied between progress reports
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Prefix of names the backend keeps for itself
const RESERVED_PREFIX: &str = ".stratus-";

/// Prefix of upload staging files
const STAGING_PREFIX: &str = ".stratus-upload-";

// ============================================================================
// Helpers
// ============================================================================

fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

fn modified_of(meta: &Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

fn directory_digest(id: &ItemId, modified: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_str().as_bytes());
    hasher.update(modified.to_rfc3339().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// MIME type guessed from the file extension
fn content_type_for(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => return None,
    };
    Some(mime.to_string())
}

/// Copies `src` (or nothing) into `dst`, reporting progress per chunk
///
/// Returns the hex SHA-256 digest and the byte count of what was written.
async fn copy_with_progress(
    src: Option<&Path>,
    dst: &Path,
    observer: &dyn TransferObserver,
) -> Result<(String, u64), BackendError> {
    let mut out = tokio::fs::File::create(dst).await?;
    let mut hasher = Sha256::new();
    let mut completed: u64 = 0;

    match src {
        Some(src) => {
            let mut input = tokio::fs::File::open(src)
                .await
                .map_err(|e| BackendError::io(e, src.display()))?;
            let total = input.metadata().await?.len();
            observer.on_progress(0, total);

            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let n = input.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n]).await?;
                hasher.update(&buf[..n]);
                completed += n as u64;
                observer.on_progress(completed, total.max(completed));
            }
        }
        None => observer.on_progress(0, 0),
    }

    out.flush().await?;
    out.sync_all().await?;
    Ok((format!("{:x}", hasher.finalize()), completed))
}

/// A partially written file that is removed unless committed
struct StagingFile {
    path: PathBuf,
    committed: bool,
}

impl StagingFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Keeps the file; call once it has been renamed or handed out
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Discarded partial transfer"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to discard partial transfer"),
        }
    }
}

/// Removes upload staging files left under `root` by an earlier process
async fn sweep_staging(root: &Path) -> Result<usize, BackendError> {
    let mut removed = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut reader = tokio::fs::read_dir(&dir).await?;
        while let Some(child) = reader.next_entry().await? {
            let file_type = child.file_type().await?;
            if file_type.is_dir() {
                pending.push(child.path());
            } else if child.file_name().to_str().is_some_and(|n| n.starts_with(STAGING_PREFIX)) {
                tokio::fs::remove_file(child.path()).await?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

async fn file_digest(path: &Path) -> Result<String, BackendError> {
    let mut input = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

async fn remove_any(local: &Path, meta: &Metadata) -> std::io::Result<()> {
    if meta.is_dir() {
        tokio::fs::remove_dir_all(local).await
    } else {
        tokio::fs::remove_file(local).await
    }
}

// ============================================================================
// DirectoryBackend
// ============================================================================

/// A remote backed by a local directory tree
pub struct DirectoryBackend {
    root: PathBuf,
    scratch: PathBuf,
    index: Mutex<SidecarIndex>,
}

impl DirectoryBackend {
    /// Opens a backend rooted at `root`, staging downloads in `scratch`
    ///
    /// Both directories are created if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created or the index is
    /// unreadable.
    pub async fn open(root: impl Into<PathBuf>, scratch: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        let scratch = scratch.into();
        tokio::fs::create_dir_all(&root).await?;
        tokio::fs::create_dir_all(&scratch).await?;
        let index = SidecarIndex::load(&root.join(INDEX_FILE_NAME)).await?;
        let swept = sweep_staging(&root).await?;

        info!(
            root = %root.display(),
            scratch = %scratch.display(),
            known_items = index.len(),
            swept,
            "Directory backend opened"
        );
        Ok(Self {
            root,
            scratch,
            index: Mutex::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    /// Local filesystem path of `path`
    pub fn local_path(&self, path: &RemotePath) -> PathBuf {
        if path.is_root() {
            self.root.clone()
        } else {
            self.root.join(path.as_str().trim_start_matches('/'))
        }
    }

    /// Identifier currently assigned to `path`, if any
    pub async fn id_of(&self, path: &RemotePath) -> Option<ItemId> {
        self.index.lock().await.id_for(path)
    }

    async fn save_index(&self, index: &SidecarIndex) -> Result<(), BackendError> {
        index.save(&self.root.join(INDEX_FILE_NAME)).await
    }

    async fn metadata(&self, path: &RemotePath) -> Result<Metadata, BackendError> {
        tokio::fs::metadata(self.local_path(path))
            .await
            .map_err(|e| BackendError::io(e, path))
    }

    async fn require_parent_dir(&self, path: &RemotePath) -> Result<(), BackendError> {
        let parent = path.parent().unwrap_or_else(RemotePath::root);
        let meta = self.metadata(&parent).await?;
        if !meta.is_dir() {
            return Err(BackendError::InvalidTarget(format!("{} is not a directory", parent)));
        }
        Ok(())
    }

    async fn entry_for(
        &self,
        index: &mut SidecarIndex,
        path: &RemotePath,
        meta: &Metadata,
    ) -> Result<(RemoteEntry, bool), BackendError> {
        let (id, assigned) = index.ensure(path);
        let modified = modified_of(meta);
        let is_directory = meta.is_dir();

        let (etag, size, content_type) = if is_directory {
            (directory_digest(&id, modified), 0, None)
        } else {
            let etag = file_digest(&self.local_path(path)).await?;
            (etag, meta.len(), path.file_name().and_then(content_type_for))
        };

        Ok((
            RemoteEntry {
                id,
                path: path.clone(),
                etag,
                size,
                modified,
                content_type,
                is_directory,
            },
            assigned,
        ))
    }

    async fn list_inner(
        &self,
        path: &RemotePath,
        depth: ListDepth,
    ) -> Result<Vec<RemoteEntry>, BackendError> {
        let meta = self.metadata(path).await?;
        if !meta.is_dir() {
            return Err(BackendError::InvalidTarget(format!("{} is not a directory", path)));
        }

        let mut index = self.index.lock().await;
        let mut entries = Vec::new();
        let mut assigned_any = false;
        let mut pending = vec![path.clone()];

        while let Some(dir) = pending.pop() {
            let mut reader = tokio::fs::read_dir(self.local_path(&dir))
                .await
                .map_err(|e| BackendError::io(e, &dir))?;
            while let Some(child) = reader.next_entry().await? {
                let file_name = child.file_name();
                let Some(name) = file_name.to_str() else {
                    warn!(parent = %dir, name = ?file_name, "Skipping non UTF-8 name");
                    continue;
                };
                if is_reserved(name) {
                    continue;
                }
                let child_path = match dir.join(name) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(parent = %dir, name, error = %e, "Skipping unrepresentable name");
                        continue;
                    }
                };
                let child_meta = child.metadata().await?;
                let (entry, assigned) = self.entry_for(&mut index, &child_path, &child_meta).await?;
                assigned_any |= assigned;
                if depth == ListDepth::Infinite && entry.is_directory {
                    pending.push(child_path);
                }
                entries.push(entry);
            }
        }

        if assigned_any {
            self.save_index(&index).await?;
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(path = %path, ?depth, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    async fn move_inner(
        &self,
        src: &RemotePath,
        dst: &RemotePath,
        overwrite: bool,
    ) -> Result<(), BackendError> {
        if src.is_root() || dst.is_root() {
            return Err(BackendError::InvalidTarget("the root cannot be moved".to_string()));
        }
        if src == dst {
            return Ok(());
        }
        if dst.is_descendant_of(src) {
            return Err(BackendError::InvalidTarget(format!(
                "cannot move {} into itself",
                src
            )));
        }
        self.metadata(src).await?;
        self.require_parent_dir(dst).await?;

        let mut index = self.index.lock().await;
        let dst_local = self.local_path(dst);
        if let Ok(existing) = tokio::fs::symlink_metadata(&dst_local).await {
            if !overwrite {
                return Err(BackendError::AlreadyExists(dst.to_string()));
            }
            remove_any(&dst_local, &existing).await?;
            index.remove_subtree(dst);
        }

        tokio::fs::rename(self.local_path(src), &dst_local)
            .await
            .map_err(|e| BackendError::io(e, src))?;
        index.move_subtree(src, dst);
        self.save_index(&index).await?;

        info!(from = %src, to = %dst, "Moved");
        Ok(())
    }

    async fn create_directory_inner(&self, path: &RemotePath) -> Result<RemoteEntry, BackendError> {
        if path.is_root() {
            return Err(BackendError::AlreadyExists(path.to_string()));
        }
        self.require_parent_dir(path).await?;

        let mut index = self.index.lock().await;
        let local = self.local_path(path);
        match tokio::fs::create_dir(&local).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BackendError::AlreadyExists(path.to_string()));
            }
            Err(e) => return Err(BackendError::io(e, path)),
        }

        // A stale identifier for a previously removed item must not be reused
        index.remove_subtree(path);
        let meta = tokio::fs::metadata(&local).await?;
        let (entry, _) = self.entry_for(&mut index, path, &meta).await?;
        self.save_index(&index).await?;

        info!(path = %path, id = %entry.id, "Directory created");
        Ok(entry)
    }

    async fn upload_inner(
        &self,
        path: &RemotePath,
        local_file: Option<&Path>,
        overwrite: bool,
        observer: &dyn TransferObserver,
    ) -> Result<UploadOutcome, BackendError> {
        let name = path
            .file_name()
            .ok_or_else(|| BackendError::InvalidTarget("cannot upload to the root".to_string()))?;
        self.require_parent_dir(path).await?;

        let target = self.local_path(path);
        if let Ok(meta) = tokio::fs::symlink_metadata(&target).await {
            if meta.is_dir() {
                return Err(BackendError::InvalidTarget(format!("{} is a directory", path)));
            }
            if !overwrite {
                return Err(BackendError::AlreadyExists(path.to_string()));
            }
        }

        let handle = TransferHandle::generate();
        observer.on_task(handle.clone());
        debug!(path = %path, handle = %handle, "Upload started");

        let parent_local = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let staging = StagingFile::new(
            parent_local.join(format!("{}{}-{}", STAGING_PREFIX, Uuid::new_v4(), name)),
        );
        let (etag, size) = copy_with_progress(local_file, staging.path(), observer).await?;

        let mut index = self.index.lock().await;
        // Re-checked under the lock: the target may have appeared meanwhile
        if !overwrite && tokio::fs::symlink_metadata(&target).await.is_ok() {
            return Err(BackendError::AlreadyExists(path.to_string()));
        }
        tokio::fs::rename(staging.path(), &target)
            .await
            .map_err(|e| BackendError::io(e, path))?;
        staging.commit();

        if !overwrite {
            // A stale identifier for a previously removed item must not be reused
            index.remove_subtree(path);
        }
        let (id, assigned) = index.ensure(path);
        if assigned {
            self.save_index(&index).await?;
        }
        let modified = modified_of(&tokio::fs::metadata(&target).await?);

        info!(path = %path, id = %id, size, "Uploaded");
        Ok(UploadOutcome {
            id,
            etag,
            modified,
            size,
        })
    }

    async fn download_inner(
        &self,
        path: &RemotePath,
        observer: &dyn TransferObserver,
    ) -> Result<DownloadOutcome, BackendError> {
        let meta = self.metadata(path).await?;
        if meta.is_dir() {
            return Err(BackendError::InvalidTarget(format!("{} is a directory", path)));
        }
        let name = path.file_name().unwrap_or("download");

        observer.on_task(TransferHandle::generate());
        tokio::fs::create_dir_all(&self.scratch).await?;
        let staged = StagingFile::new(self.scratch.join(format!("{}-{}", Uuid::new_v4(), name)));

        let source = self.local_path(path);
        let (etag, size) = copy_with_progress(Some(&source), staged.path(), observer)
            .await
            .map_err(|e| match e {
                BackendError::NotFound(_) => BackendError::NotFound(path.to_string()),
                other => other,
            })?;
        let local_file = staged.path().to_path_buf();
        staged.commit();

        debug!(path = %path, local = %local_file.display(), size, "Downloaded");
        Ok(DownloadOutcome {
            local_file,
            etag,
            size,
            modified: modified_of(&meta),
        })
    }

    async fn delete_inner(&self, path: &RemotePath) -> Result<(), BackendError> {
        if path.is_root() {
            return Err(BackendError::InvalidTarget("the root cannot be deleted".to_string()));
        }
        let mut index = self.index.lock().await;
        let local = self.local_path(path);
        let meta = tokio::fs::symlink_metadata(&local)
            .await
            .map_err(|e| BackendError::io(e, path))?;
        remove_any(&local, &meta).await?;
        index.remove_subtree(path);
        self.save_index(&index).await?;

        info!(path = %path, directory = meta.is_dir(), "Deleted");
        Ok(())
    }
}

// ============================================================================
// IRemoteClient implementation
// ============================================================================

#[async_trait::async_trait]
impl IRemoteClient for DirectoryBackend {
    async fn move_item(
        &self,
        src: &RemotePath,
        dst: &RemotePath,
        overwrite: bool,
    ) -> Result<(), RemoteError> {
        Ok(self.move_inner(src, dst, overwrite).await?)
    }

    async fn create_directory(&self, path: &RemotePath) -> Result<RemoteEntry, RemoteError> {
        Ok(self.create_directory_inner(path).await?)
    }

    async fn upload(
        &self,
        path: &RemotePath,
        local_file: Option<&Path>,
        overwrite: bool,
        observer: &dyn TransferObserver,
    ) -> Result<UploadOutcome, RemoteError> {
        Ok(self.upload_inner(path, local_file, overwrite, observer).await?)
    }

    async fn download(
        &self,
        path: &RemotePath,
        observer: &dyn TransferObserver,
    ) -> Result<DownloadOutcome, RemoteError> {
        Ok(self.download_inner(path, observer).await?)
    }

    async fn delete(&self, path: &RemotePath) -> Result<(), RemoteError> {
        Ok(self.delete_inner(path).await?)
    }

    async fn list(
        &self,
        path: &RemotePath,
        depth: ListDepth,
    ) -> Result<Vec<RemoteEntry>, RemoteError> {
        Ok(self.list_inner(path, depth).await?)
    }
}
