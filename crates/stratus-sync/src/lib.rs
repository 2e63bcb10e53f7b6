//! Stratus Sync - Item synchronization engine
//!
//! Receives filesystem-projection requests from a host, orders them per
//! domain, drives the remote client and reconciles the results into the
//! metadata store.
//!
//! ## Modules
//!
//! - [`engine`] - [`SyncEngine`], the `IProjectionHost` implementation
//! - [`serializer`] - FIFO operation lanes (one in-flight job per lane)
//! - [`transfers`] - Cancellable, observable upload/download registry
//! - [`enumerator`] - Paginated fast/full container listings and merge
//! - [`adapter`] - Record to projected-item conversion
//! - [`signaler`] - Broadcast working-set change signals

pub mod adapter;
pub mod engine;
pub mod enumerator;
pub mod serializer;
pub mod signaler;
pub mod transfers;

pub use adapter::ItemAdapter;
pub use engine::{EngineSettings, SyncEngine};
pub use enumerator::{Enumerator, MergeReport};
pub use serializer::{LaneKey, OperationSerializer};
pub use signaler::BroadcastSignaler;
pub use transfers::{TransferProgress, TransferRegistry, TransferTicket};
