//! The invocation-wide cancellation signal.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Signals that a test invocation should stop, e.g. because the CI job was
/// aborted.
///
/// The first reason given wins; later calls to [`CancellationToken::cancel`]
/// are ignored. Waiters either check [`CancellationToken::is_cancelled`]
/// between polls or race [`CancellationToken::cancelled`] against their work.
#[derive(Default)]
pub struct CancellationToken {
    flag: AtomicBool,
    cause: RwLock<Option<String>>,
    /// Wakes tasks parked in `cancelled()`.
    wake: Notify,
}

impl CancellationToken {
    /// Creates a token nobody has cancelled yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the invocation. Only the first `reason` is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        let first = self
            .flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.cause.write().replace(reason.into());
            self.wake.notify_waiters();
        }
    }

    /// True once `cancel` was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Why the invocation was cancelled.
    ///
    /// Can briefly be `None` right after [`Self::is_cancelled`] turns true.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.cause.read().clone()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            // Registered before the flag check below, so a concurrent cancel still wakes us.
            let woken = self.wake.notified();
            if self.is_cancelled() {
                break;
            }
            woken.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("is_cancelled", &self.is_cancelled())
            .field("cause", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fresh_token_has_no_cause() {
        let ctx = CancellationToken::new();
        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.reason(), None);
    }

    #[test]
    fn test_abort_keeps_first_cause() {
        let ctx = CancellationToken::new();
        ctx.cancel("job aborted by user");
        ctx.cancel("job timed out");

        assert!(ctx.is_cancelled());
        assert_eq!(ctx.reason().as_deref(), Some("job aborted by user"));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_for_cancelled_token() {
        let ctx = CancellationToken::new();
        ctx.cancel("SIGTERM");
        let waited = tokio::time::timeout(Duration::from_secs(1), ctx.cancelled()).await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_wakes_pod_waiter() {
        let ctx = Arc::new(CancellationToken::new());
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                ctx.cancelled().await;
                ctx.reason()
            }
        });

        tokio::task::yield_now().await;
        ctx.cancel("SIGINT");

        let cause = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert_eq!(cause.ok().and_then(Result::ok).flatten().as_deref(), Some("SIGINT"));
    }
}
