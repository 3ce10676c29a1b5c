use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::SendError;

/// Creates the two halves of a single-fulfillment ack handoff: the promise
/// goes into the connection's pending table for the reader loop to resolve,
/// the future is handed to the caller of the send operation.
pub fn ack_channel() -> (AckPromise, AckFuture) {
    let (tx, rx) = oneshot::channel();
    (AckPromise { tx }, AckFuture { rx })
}

/// Write side of the handoff. Resolving consumes the promise, so resolving
/// twice is impossible by construction. Dropping it unresolved reads as a
/// closed connection on the waiting side.
pub struct AckPromise {
    tx: oneshot::Sender<Result<(), SendError>>,
}

impl AckPromise {
    /// The send was acknowledged with code 0.
    pub fn resolve(self) {
        // the waiter may have timed out and walked away; that is fine
        let _ = self.tx.send(Ok(()));
    }

    pub fn fail(self, error: SendError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Read side of the handoff.
pub struct AckFuture {
    rx: oneshot::Receiver<Result<(), SendError>>,
}

impl AckFuture {
    /// Waits for the resolution, giving up with [SendError::AckTimeout] after
    /// `timeout`. Giving up abandons the slot; a resolution arriving later is
    /// discarded by the reader loop's unmatched-sequence rule.
    pub async fn wait(self, timeout: Duration) -> Result<(), SendError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SendError::Closed),
            Err(_) => Err(SendError::AckTimeout),
        }
    }

    /// Waits without a deadline.
    pub async fn get(self) -> Result<(), SendError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(SendError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_then_wait() {
        let (promise, future) = ack_channel();
        promise.resolve();
        assert_eq!(future.wait(Duration::from_secs(1)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_fail_then_wait() {
        let (promise, future) = ack_channel();
        promise.fail(SendError::Rejected(3));
        assert_eq!(future.wait(Duration::from_secs(1)).await, Err(SendError::Rejected(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let (promise, future) = ack_channel();
        assert_eq!(future.wait(Duration::from_secs(30)).await, Err(SendError::AckTimeout));
        drop(promise);
    }

    #[tokio::test]
    async fn test_dropped_promise_reads_as_closed() {
        let (promise, future) = ack_channel();
        drop(promise);
        assert_eq!(future.get().await, Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_resolution_after_abandoned_wait_is_discarded() {
        let (promise, future) = ack_channel();
        drop(future);
        // must not panic: the waiter is gone
        promise.resolve();
    }
}
