use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

pub type ShutdownSender = broadcast::Sender<()>;
pub type ShutdownReceiver = broadcast::Receiver<()>;

/// Broadcast channel size for shutdown notifications (single signal fan-out).
const SHUTDOWN_CHANNEL_CAPACITY: usize = 1;

#[must_use]
pub fn shutdown_channel() -> (ShutdownSender, ShutdownReceiver) {
    broadcast::channel::<()>(SHUTDOWN_CHANNEL_CAPACITY)
}

/// Level-triggered view of a shutdown broadcast. Once cancelled it stays
/// cancelled, so late subscribers never miss the signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// shutdown sender goes away without sending.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// A signal that is never raised.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }
}

/// Forward the first shutdown notification into a [`CancelSignal`].
///
/// A lagged receiver still counts as a shutdown; a closed channel does not.
pub fn watch_shutdown(mut shutdown_rx: ShutdownReceiver) -> (CancelSignal, JoinHandle<()>) {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        match shutdown_rx.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                drop(cancel_tx.send(true));
            }
            Err(broadcast::error::RecvError::Closed) => {}
        }
    });
    (CancelSignal { rx: cancel_rx }, handle)
}
