//! Stratus Backend - Directory-backed remote
//!
//! Implements the [`IRemoteClient`](stratus_core::ports::IRemoteClient) port
//! over a plain local directory. The daemon uses it as its remote, and the
//! engine integration tests run against it on a temporary directory.
//!
//! ## Modules
//!
//! - [`index`] - Sidecar index that gives every item a stable identifier
//! - [`directory`] - The [`DirectoryBackend`] port implementation

pub mod directory;
pub mod index;

pub use directory::DirectoryBackend;

use stratus_core::domain::RemoteError;
use thiserror::Error;

/// Errors raised inside the directory backend
///
/// Converted to [`RemoteError`] at the port boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The path does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The target exists and overwriting was not requested
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The operation does not apply to this kind of item
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sidecar index could not be read or written
    #[error("Index error: {0}")]
    Index(String),
}

impl BackendError {
    /// Maps an I/O error on `path`, turning `NotFound` into [`BackendError::NotFound`]
    pub fn io(err: std::io::Error, path: impl std::fmt::Display) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            BackendError::NotFound(path.to_string())
        } else {
            BackendError::Io(err)
        }
    }
}

impl From<BackendError> for RemoteError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(path) => RemoteError::NotFound(path),
            BackendError::AlreadyExists(path) => {
                RemoteError::failed(412, format!("{} already exists", path))
            }
            BackendError::InvalidTarget(description) => RemoteError::failed(409, description),
            BackendError::Io(e) => RemoteError::failed(500, e.to_string()),
            BackendError::Index(description) => RemoteError::failed(500, description),
        }
    }
}
