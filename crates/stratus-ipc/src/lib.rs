//! Stratus IPC - Companion process channel
//!
//! Reports sync events to a companion application (for example a tray UI)
//! over a Unix domain socket, one line per message:
//!
//! - outbound: `EVENT <json>` for every [`SyncEvent`](stratus_core::ports::SyncEvent)
//! - inbound: any non-empty line, answered with `ACK <n>`
//!
//! The channel implements the
//! [`ISyncEventSink`](stratus_core::ports::ISyncEventSink) port, so the
//! engine never waits on the companion.

pub mod channel;

pub use channel::CompanionChannel;

use thiserror::Error;

/// Errors raised by the companion channel
#[derive(Debug, Error)]
pub enum IpcError {
    /// The companion socket could not be reached
    #[error("Failed to connect to {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the socket failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An event could not be serialized
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    /// The channel was shut down
    #[error("Channel closed")]
    Closed,
}
