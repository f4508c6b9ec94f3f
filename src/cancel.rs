//! A minimal cooperative cancellation signal.
//!
//! Every suspending operation in [`crate::uci::UciSession`] and [`crate::pool::Pool`] accepts a
//! [`CancelToken`]; timeouts are modeled as cancellation fired from a deadline task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cheaply cloneable cancellation signal with a single firing.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<Inner>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is never cancelled, for callers with nothing to cancel on.
    pub fn never() -> Self {
        Self::default()
    }

    /// A token that fires automatically once `timeout` elapses.
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        let fired = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            fired.cancel();
        });
        token
    }

    /// Fires the signal. Idempotent: firing twice is a no-op after the first.
    pub fn cancel(&self) {
        if !self.0.cancelled.swap(true, Ordering::SeqCst) {
            self.0.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token fires. Resolves immediately if already cancelled.
    ///
    /// Registers the `Notified` future (via `enable()`) before the second `is_cancelled()`
    /// check, so a `cancel()` landing between the first check and this registration is still
    /// observed instead of racing `notify_waiters()` against a not-yet-registered waiter.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let notified = self.0.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        assert!(!token.is_cancelled());
        token.cancel();
        task.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("should resolve immediately");
    }
}
