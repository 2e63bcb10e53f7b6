//! Domain error types
//!
//! This module defines two families of errors:
//! - [`DomainError`] for validation failures when constructing domain values
//! - [`SyncError`] for the tagged outcomes returned to the host projection layer
//!
//! [`RemoteError`] is the error type of the remote client port; it converts
//! one-to-one into [`SyncError`].

use thiserror::Error;

/// Errors that can occur while constructing or validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidPath(String),

    /// Invalid item identifier
    #[error("Invalid item identifier: {0}")]
    InvalidId(String),

    /// Unknown item status string
    #[error("Invalid item status: {0}")]
    InvalidStatus(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors surfaced to the host projection layer
///
/// Every engine operation returns one of these on failure. The variant is
/// what the host uses to decide how to present local unavailability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No account or session is established for the domain
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Identifier or parent could not be resolved locally or remotely
    #[error("No such item: {0}")]
    NoSuchItem(String),

    /// The request asks for something the engine does not provide
    #[error("Feature unsupported: {0}")]
    FeatureUnsupported(String),

    /// The remote client reported a failure
    #[error("Remote operation failed ({code}): {description}")]
    RemoteOperationFailed {
        /// Backend status code
        code: i32,
        /// Human-readable description from the backend
        description: String,
    },

    /// The operation was cancelled before completion
    #[error("Operation cancelled")]
    Cancelled,

    /// The metadata store failed on the primary path of an operation
    #[error("Metadata store failure: {0}")]
    Storage(String),
}

impl SyncError {
    /// Stable short code used in companion events and logs
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::NotAuthenticated => "not_authenticated",
            SyncError::NoSuchItem(_) => "no_such_item",
            SyncError::FeatureUnsupported(_) => "feature_unsupported",
            SyncError::RemoteOperationFailed { .. } => "remote_operation_failed",
            SyncError::Cancelled => "cancelled",
            SyncError::Storage(_) => "storage",
        }
    }

    /// Wraps a metadata store failure
    pub fn storage(err: impl std::fmt::Display) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<DomainError> for SyncError {
    fn from(err: DomainError) -> Self {
        SyncError::NoSuchItem(err.to_string())
    }
}

/// Errors reported by an [`IRemoteClient`](crate::ports::IRemoteClient)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Credentials were rejected or are missing
    #[error("Remote rejected credentials")]
    NotAuthenticated,

    /// The remote path does not exist
    #[error("Remote item not found: {0}")]
    NotFound(String),

    /// The remote call was cancelled
    #[error("Remote call cancelled")]
    Cancelled,

    /// Any other failure, with the backend's status code
    #[error("Remote failure ({code}): {description}")]
    Failed {
        /// Backend status code
        code: i32,
        /// Human-readable description
        description: String,
    },
}

impl RemoteError {
    /// Convenience constructor for [`RemoteError::Failed`]
    pub fn failed(code: i32, description: impl Into<String>) -> Self {
        RemoteError::Failed {
            code,
            description: description.into(),
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotAuthenticated => SyncError::NotAuthenticated,
            RemoteError::NotFound(path) => SyncError::NoSuchItem(path),
            RemoteError::Cancelled => SyncError::Cancelled,
            RemoteError::Failed { code, description } => {
                SyncError::RemoteOperationFailed { code, description }
            }
        }
    }
}
