use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A one-shot action scheduled to run after a delay, used for the websocket
/// connect timeout, the transports' reconnect delays and the connection's
/// disconnect-timeout countdown.
///
/// Cancelling aborts the underlying task: firing after a cancel is
/// impossible, and cancelling after the action already ran is a no-op.
pub(crate) struct DelayedOperation {
    handle: JoinHandle<()>,
}

impl DelayedOperation {
    pub(crate) fn schedule<F>(delay: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });

        DelayedOperation { handle }
    }

    pub(crate) fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for DelayedOperation {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
