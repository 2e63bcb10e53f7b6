//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for identifiers and paths. Each newtype checks
//! its invariants at construction time so the rest of the engine can rely
//! on them.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// Item identifiers
// ============================================================================

/// Reserved identifier of the root container
const ROOT_ID: &str = "__root__";

/// Backend-assigned, permanent identifier of an item
///
/// Opaque to the engine. The root container uses a reserved value that has
/// no stored record and is never looked up remotely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Create a new ItemId
    ///
    /// # Errors
    /// Returns error if the identifier is empty or contains whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidId(
                "Item identifier cannot be empty".to_string(),
            ));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidId(format!(
                "Item identifier contains whitespace: {id}"
            )));
        }
        Ok(Self(id))
    }

    /// The reserved root container identifier
    #[must_use]
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// Provisional identifier for work that has no backend id yet
    #[must_use]
    pub fn provisional() -> Self {
        Self(format!("provisional-{}", Uuid::new_v4()))
    }

    /// Returns true for the root container identifier
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ItemId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

// ============================================================================
// Remote paths
// ============================================================================

/// An absolute path in the remote namespace (must start with /)
///
/// Paths never end with a separator (except the root), never contain
/// empty segments, and never contain `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a new RemotePath
    ///
    /// # Errors
    /// Returns error if the path is relative or has an invalid segment
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "Remote path must start with '/': {path}"
            )));
        }
        if path == "/" {
            return Ok(Self(path));
        }
        for segment in path[1..].split('/') {
            validate_segment(segment).map_err(|_| {
                DomainError::InvalidPath(format!("Invalid segment '{segment}' in {path}"))
            })?;
        }
        Ok(Self(path))
    }

    /// Create the root path "/"
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns true for "/"
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a single path component
    ///
    /// # Errors
    /// Returns error if the component is empty, contains '/', or is `.`/`..`
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        validate_segment(component)?;
        if self.is_root() {
            Ok(Self(format!("/{component}")))
        } else {
            Ok(Self(format!("{}/{component}", self.0)))
        }
    }

    /// Get the parent path
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Get the last path component
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Segment-aware prefix test: `/a/b` starts with `/a` but not with `/a/b2`'s `/a/b`
    #[must_use]
    pub fn starts_with(&self, ancestor: &RemotePath) -> bool {
        if ancestor.is_root() || self == ancestor {
            return true;
        }
        self.0
            .strip_prefix(ancestor.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Returns true if `self` lies strictly below `ancestor`
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &RemotePath) -> bool {
        self != ancestor && self.starts_with(ancestor)
    }

    /// Replace the `old_prefix` part of this path with `new_prefix`
    ///
    /// Returns `None` if this path does not lie under `old_prefix`.
    #[must_use]
    pub fn rebase(&self, old_prefix: &RemotePath, new_prefix: &RemotePath) -> Option<Self> {
        if !self.starts_with(old_prefix) {
            return None;
        }
        let rest = if old_prefix.is_root() {
            &self.0[..]
        } else {
            &self.0[old_prefix.0.len()..]
        };
        let rebased = match (new_prefix.is_root(), rest.is_empty()) {
            (true, true) => "/".to_string(),
            (true, false) => rest.to_string(),
            (false, _) if rest == "/" => new_prefix.0.clone(),
            (false, _) => format!("{}{rest}", new_prefix.0),
        };
        Some(Self(rebased))
    }

    /// Number of segments below the root
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.matches('/').count()
        }
    }
}

fn validate_segment(segment: &str) -> Result<(), DomainError> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('/') {
        return Err(DomainError::InvalidPath(format!(
            "Invalid path component: {segment:?}"
        )));
    }
    Ok(())
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemotePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RemotePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

// ============================================================================
// Transfer handles
// ============================================================================

/// Opaque reference to an in-flight background transfer
///
/// Persisted on the item record so a restarted process can correlate the
/// record with the transfer the remote client reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferHandle(String);

impl TransferHandle {
    /// Wrap a handle string reported by the remote client
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Generate a fresh random handle
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TransferHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
