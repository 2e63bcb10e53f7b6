//! Event reporting ports (driven/secondary ports)
//!
//! Two outbound channels leave the engine:
//! - [`IChangeSignaler`] tells the host projection layer that its working
//!   set changed and should be re-enumerated.
//! - [`ISyncEventSink`] reports sync events to a companion process (for
//!   example a tray UI) over whatever transport the adapter uses.
//!
//! ## Design Notes
//!
//! - Both are fire-and-forget and synchronous. Delivery failures are the
//!   adapter's concern and must never fail the operation that emitted them.
//! - Events are `Serialize` so transports can encode them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ItemId, RemotePath, TransferKind};

// ============================================================================
// Change signaling
// ============================================================================

/// Why the working set changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ChangeReason {
    /// A directory was renamed or moved and its subtree followed
    DirectoryMoved { id: ItemId },
    /// A directory and its subtree were removed
    DirectoryDeleted { id: ItemId },
    /// An enumeration merged remote changes into the store
    EnumerationMerged { container: ItemId },
    /// The host asked for a refresh of materialized items
    MaterializedItemsChanged,
}

/// A working-set change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSignal {
    pub reason: ChangeReason,
    pub at: DateTime<Utc>,
}

impl ChangeSignal {
    /// A signal stamped with the current time
    pub fn now(reason: ChangeReason) -> Self {
        Self {
            reason,
            at: Utc::now(),
        }
    }
}

/// Port trait for notifying the host that its working set changed
pub trait IChangeSignaler: Send + Sync {
    /// Signals that the working set changed
    fn signal_working_set(&self, reason: ChangeReason);
}

// ============================================================================
// Companion events
// ============================================================================

/// A sync event reported to the companion process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SyncEvent {
    /// A local create reached the backend
    ItemCreated { id: ItemId, path: RemotePath },
    /// A local modification reached the backend
    ItemModified { id: ItemId, path: RemotePath },
    /// A local delete reached the backend
    ItemDeleted { id: ItemId, path: RemotePath },
    /// An operation on an item failed
    ItemFailed {
        id: Option<ItemId>,
        operation: String,
        code: String,
        message: String,
    },
    /// A container enumeration finished and was merged
    EnumerationFinished {
        container: ItemId,
        added: usize,
        updated: usize,
        moved: usize,
        deleted: usize,
    },
    /// A transfer was cancelled by the host
    TransferCancelled { id: ItemId, kind: TransferKind },
}

impl SyncEvent {
    /// Short name of the event kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::ItemCreated { .. } => "item_created",
            SyncEvent::ItemModified { .. } => "item_modified",
            SyncEvent::ItemDeleted { .. } => "item_deleted",
            SyncEvent::ItemFailed { .. } => "item_failed",
            SyncEvent::EnumerationFinished { .. } => "enumeration_finished",
            SyncEvent::TransferCancelled { .. } => "transfer_cancelled",
        }
    }
}

/// Port trait for reporting sync events to a companion process
///
/// ## Implementation Notes
///
/// - `emit` must not block; queue or drop when the transport is slow.
/// - Implementations should log, not panic, when the peer is gone.
pub trait ISyncEventSink: Send + Sync {
    /// Reports an event
    fn emit(&self, event: SyncEvent);
}
