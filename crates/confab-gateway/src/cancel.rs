//! Cooperative cancellation.
//!
//! Every invocation carries a [`CancelToken`]. The owner of the paired
//! [`CancelHandle`] (the engine for invocation-level tokens, the
//! gateway for per-attempt tokens) signals it on barge-in, session
//! termination, or deadline expiry; the tool handler observes the
//! token, releases its resources, and returns. Cancellation is never
//! delivered as an asynchronous exception into handler state.

use tokio::sync::watch;

/// Signalling side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Creates a linked handle/token pair.
    #[must_use]
    pub fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelToken { rx })
    }

    /// Signals cancellation to every cloned token.
    ///
    /// Idempotent; later calls are no-ops.
    pub fn cancel(&self) {
        // send_replace never fails even with no receivers alive.
        self.tx.send_replace(true);
    }

    /// Returns `true` if this handle has already been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observing side of a cancellation pair.
///
/// Cheap to clone; all clones observe the same signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Creates a token that can never be cancelled.
    ///
    /// For tools invoked outside any conversational turn (operator
    /// tooling, tests).
    #[must_use]
    pub fn never() -> Self {
        let (handle, token) = CancelHandle::new();
        // Keep the sender alive forever so the token never reads as
        // closed.
        std::mem::forget(handle);
        token
    }

    /// Returns `true` if cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is signalled.
    ///
    /// Also resolves if the handle is dropped without signalling —
    /// an orphaned invocation must not hang on its token.
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        loop {
            if self.rx.changed().await.is_err() {
                return; // handle dropped
            }
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token_observes_cancel() {
        let (handle, mut token) = CancelHandle::new();
        assert!(!token.is_cancelled());

        handle.cancel();
        assert!(token.is_cancelled());
        assert!(handle.is_cancelled());

        // Resolves immediately once cancelled.
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("cancelled() should resolve");
    }

    #[tokio::test]
    async fn clones_share_the_signal() {
        let (handle, token) = CancelHandle::new();
        let cloned = token.clone();

        handle.cancel();
        assert!(cloned.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let (handle, token) = CancelHandle::new();
        handle.cancel();
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_handle_unblocks_waiters() {
        let (handle, mut token) = CancelHandle::new();
        drop(handle);

        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("dropped handle must unblock cancelled()");
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn never_token_stays_pending() {
        let mut token = CancelToken::never();
        assert!(!token.is_cancelled());

        let result =
            tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(result.is_err(), "never() token must not resolve");
    }

    #[tokio::test]
    async fn waiter_wakes_on_late_cancel() {
        let (handle, mut token) = CancelHandle::new();

        let waiter = tokio::spawn(async move {
            token.cancelled().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }
}
