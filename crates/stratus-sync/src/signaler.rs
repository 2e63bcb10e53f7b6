//! Working-set change signaling over a broadcast channel

use tokio::sync::broadcast;

use stratus_core::ports::{ChangeReason, ChangeSignal, IChangeSignaler};

/// Signals buffered per subscriber before the slowest one starts lagging
const DEFAULT_CAPACITY: usize = 256;

/// [`IChangeSignaler`] that publishes on a `tokio::sync::broadcast` channel
///
/// Hosts call [`BroadcastSignaler::subscribe`] and re-enumerate their working
/// set on each [`ChangeSignal`]. Signals sent with no subscriber are dropped.
pub struct BroadcastSignaler {
    tx: broadcast::Sender<ChangeSignal>,
}

impl Default for BroadcastSignaler {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastSignaler {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSignal> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl IChangeSignaler for BroadcastSignaler {
    fn signal_working_set(&self, reason: ChangeReason) {
        tracing::debug!(?reason, "Signaling working set change");
        if self.tx.send(ChangeSignal::now(reason)).is_err() {
            tracing::trace!("No working-set subscribers");
        }
    }
}
