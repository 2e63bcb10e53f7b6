//! Domain entities and business logic
//!
//! This module contains the core domain types:
//! - Newtypes for identifiers, remote paths and transfer handles
//! - The persistent item record and its status
//! - Host-facing projected items, templates and change sets
//! - The account that authenticates a domain
//! - Domain-specific error types

pub mod account;
pub mod errors;
pub mod item;
pub mod newtypes;
pub mod projected;

// Re-export commonly used types
pub use account::Account;
pub use errors::{DomainError, RemoteError, SyncError};
pub use item::{split_path, ItemRecord, ItemStatus, TransferKind};
pub use newtypes::*;
pub use projected::{
    Capabilities, ChangedFields, ItemField, ItemTemplate, ProjectedItem, DEFAULT_CONTENT_TYPE,
    DIRECTORY_CONTENT_TYPE,
};
