//! Cooperative cancellation for background loops.
//!
//! A shutdown signal is a `watch` channel of `bool`: sending `true` asks every
//! listener to stop after the work it has in flight.

use tokio::sync::watch;

/// Creates a new shutdown signal in the "running" state.
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once `rx` observes `true`.
///
/// If the sender is dropped without ever signalling, this never resolves: a
/// vanished controller is not a shutdown request.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
