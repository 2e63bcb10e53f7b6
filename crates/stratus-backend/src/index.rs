//! Sidecar identity index
//!
//! Maps each remote path to the identifier assigned when the item was first
//! seen. Stored as JSON next to the content so identifiers survive restarts.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stratus_core::domain::{ItemId, RemotePath};

use crate::BackendError;

/// File name of the sidecar index inside the backend root
pub const INDEX_FILE_NAME: &str = ".stratus-index.json";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarIndex {
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

impl SidecarIndex {
    /// Loads the index from `file`; a missing file yields an empty index
    pub async fn load(file: &Path) -> Result<Self, BackendError> {
        match tokio::fs::read(file).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| BackendError::Index(format!("{}: {}", file.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(BackendError::Io(e)),
        }
    }

    /// Writes the index through a temporary sibling and a rename
    pub async fn save(&self, file: &Path) -> Result<(), BackendError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| BackendError::Index(e.to_string()))?;
        let tmp = file.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, file).await?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn id_for(&self, path: &RemotePath) -> Option<ItemId> {
        self.entries
            .get(path.as_str())
            .and_then(|id| ItemId::new(id.clone()).ok())
    }

    /// Identifier of `path`, assigning a fresh one if the path is new
    ///
    /// The flag is true when an identifier was assigned.
    pub fn ensure(&mut self, path: &RemotePath) -> (ItemId, bool) {
        if let Some(id) = self.id_for(path) {
            return (id, false);
        }
        let id = Uuid::new_v4().to_string();
        self.entries.insert(path.as_str().to_string(), id.clone());
        // A UUID is never empty
        (ItemId::new(id).unwrap_or_else(|_| ItemId::provisional()), true)
    }

    /// Re-keys `old` and everything below it under `new`
    pub fn move_subtree(&mut self, old: &RemotePath, new: &RemotePath) {
        let moved: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|(key, _)| Self::in_subtree(key, old))
            .map(|(key, id)| (key.clone(), id.clone()))
            .collect();
        for (key, id) in moved {
            self.entries.remove(&key);
            let rebased = format!("{}{}", new.as_str(), &key[old.as_str().len()..]);
            self.entries.insert(rebased, id);
        }
    }

    /// Forgets `path` and everything below it
    pub fn remove_subtree(&mut self, path: &RemotePath) {
        self.entries.retain(|key, _| !Self::in_subtree(key, path));
    }

    fn in_subtree(key: &str, root: &RemotePath) -> bool {
        key == root.as_str()
            || key
                .strip_prefix(root.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}
