//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Driven ports are implemented by adapter crates;
//! the driving port [`IProjectionHost`] is implemented by the engine.
//!
//! ## Ports Overview
//!
//! - [`IRemoteClient`] - Backend move/upload/download/delete/list
//! - [`IMetadataStore`] - Persistent item records and tree shape
//! - [`IChangeSignaler`] - Working-set change notifications for the host
//! - [`ISyncEventSink`] - Sync events for a companion process
//! - [`IProjectionHost`] - Host-facing request verbs

pub mod events;
pub mod metadata_store;
pub mod projection;
pub mod remote_client;

pub use events::{ChangeReason, ChangeSignal, IChangeSignaler, ISyncEventSink, SyncEvent};
pub use metadata_store::IMetadataStore;
pub use projection::{EnumerationPage, FetchedContents, IProjectionHost, PageToken};
pub use remote_client::{
    DownloadOutcome, IRemoteClient, ListDepth, NoopObserver, RemoteEntry, TransferObserver,
    UploadOutcome,
};
