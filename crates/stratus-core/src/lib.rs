//! Stratus Core - Domain model and port definitions
//!
//! This crate contains the hexagonal core of the item synchronization engine:
//! - **Domain entities** - `ItemRecord`, `ProjectedItem`, `ItemTemplate`, `Account`
//! - **Error taxonomy** - `SyncError` (host-facing), `RemoteError`, `DomainError`
//! - **Port definitions** - `IRemoteClient`, `IMetadataStore`, `IChangeSignaler`,
//!   `ISyncEventSink`, `IProjectionHost`
//! - **Configuration** - YAML-backed `Config` with validation
//!
//! # Architecture
//!
//! The domain module holds pure value types with no I/O. Ports define the
//! trait interfaces that adapter crates implement (`stratus-cache` for the
//! metadata store, `stratus-backend` for a remote client, `stratus-ipc` for
//! the companion channel) and that `stratus-sync` consumes.

pub mod config;
pub mod domain;
pub mod ports;
