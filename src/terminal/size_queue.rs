//! Pull-based terminal size sequence
//!
//! Resize events are pushed by the connection-read pump and pulled by the exec
//! session. Only the latest unconsumed size is kept: resizing is idempotent, so
//! intermediate values can be dropped when the producer outruns the consumer.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::TerminalSize;

/// Ordered, coalescing sequence of terminal sizes
pub struct SizeQueue {
    initial: Option<TerminalSize>,
    latest: watch::Receiver<Option<TerminalSize>>,
    republisher: JoinHandle<()>,
}

impl SizeQueue {
    /// Create a queue that yields `initial` first, then sizes from `inbound`.
    ///
    /// Spawns a background task that republishes inbound sizes into a 1-slot
    /// buffer. The task ends when `inbound` closes, after which [`next`]
    /// reports end-of-sequence once any unseen size has been returned.
    ///
    /// [`next`]: SizeQueue::next
    pub fn new(mut inbound: mpsc::Receiver<TerminalSize>, initial: TerminalSize) -> Self {
        let (slot_tx, slot_rx) = watch::channel(None);

        let republisher = tokio::spawn(async move {
            while let Some(size) = inbound.recv().await {
                if slot_tx.send(Some(size)).is_err() {
                    break;
                }
            }
        });

        Self {
            initial: Some(initial),
            latest: slot_rx,
            republisher,
        }
    }

    /// Next terminal size, or `None` once the inbound stream has closed
    pub async fn next(&mut self) -> Option<TerminalSize> {
        if let Some(size) = self.initial.take() {
            return Some(size);
        }

        loop {
            self.latest.changed().await.ok()?;
            if let Some(size) = *self.latest.borrow_and_update() {
                return Some(size);
            }
        }
    }
}

impl Drop for SizeQueue {
    fn drop(&mut self) {
        self.republisher.abort();
    }
}
