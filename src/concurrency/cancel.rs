//! Cancellation signaling for in-flight probes.
//!
//! This module abstracts tokio's watch channels into a cancellation signal
//! scoped to a single wait call. The signal carries no data payload - it only
//! notifies probe tasks that the race has been decided and they should stop.
//!
//! Unlike mpsc channels, all receivers observe the same signal simultaneously,
//! which is what cancellation needs: one sender, many listeners, no draining.

use tokio::sync::watch;

/// Transmitter side of a cancellation channel.
///
/// Held by the coordinator of a wait call. Dropping the transmitter is
/// equivalent to cancelling, so probes can never outlive the coordinator's
/// intent by missing a signal.
#[derive(Debug, Clone)]
pub struct CancelTx(watch::Sender<()>);

impl CancelTx {
    /// Signals cancellation to every subscribed receiver.
    ///
    /// Returns an error if no receivers remain, which callers may ignore:
    /// it means every probe has already reached a terminal state.
    pub fn cancel(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new receiver attached to this transmitter.
    pub fn subscribe(&self) -> CancelRx {
        CancelRx(self.0.subscribe())
    }
}

/// Receiver side of a cancellation channel.
///
/// Each probe task holds its own clone and races [`CancelRx::cancelled`]
/// against its work inside `tokio::select!`.
#[derive(Debug, Clone)]
pub struct CancelRx(watch::Receiver<()>);

impl CancelRx {
    /// Completes once cancellation has been signalled.
    ///
    /// A dropped transmitter counts as cancellation: if the coordinator is
    /// gone, no probe result can be consumed anymore and continuing would
    /// only leak work.
    pub async fn cancelled(&mut self) {
        let _ = self.0.changed().await;
    }
}

/// Creates a new cancellation channel.
///
/// The channel starts in the "not cancelled" state; receivers suspend in
/// [`CancelRx::cancelled`] until [`CancelTx::cancel`] is called or the
/// transmitter is dropped.
pub fn create_cancel_channel() -> (CancelTx, CancelRx) {
    let (tx, rx) = watch::channel(());
    (CancelTx(tx), CancelRx(rx))
}
