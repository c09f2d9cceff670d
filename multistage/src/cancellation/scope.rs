//! Scoped reactions to cancellation.

use super::CancellationToken;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A group of background reactions tied to a parent cancellation token.
///
/// Each reaction runs at most once, when the parent is cancelled while the
/// scope is still open. [`CancellationScope::close`] stops reactions that
/// never fired and joins every spawned task, so no watcher outlives the
/// call that opened the scope. Dropping an unclosed scope still releases
/// its watchers, but does not wait for them.
pub struct CancellationScope {
    /// Name used in logs.
    name: String,
    /// The invocation's token.
    parent: Arc<CancellationToken>,
    /// Cancelled when the scope closes.
    closed: Arc<CancellationToken>,
    /// Handles to spawned watchers.
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl CancellationScope {
    /// Opens a new scope under the given token.
    #[must_use]
    pub fn new(name: impl Into<String>, parent: Arc<CancellationToken>) -> Self {
        Self {
            name: name.into(),
            parent,
            closed: Arc::new(CancellationToken::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns a watcher that runs `reaction` if the parent is cancelled
    /// before the scope closes.
    pub fn on_cancel<F, Fut>(&self, name: &str, reaction: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let parent = self.parent.clone();
        let closed = self.closed.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                // A cancellation that raced with close still gets its reaction.
                biased;
                () = parent.cancelled() => reaction().await,
                () = closed.cancelled() => {}
            }
        });

        self.handles.lock().push((name.to_string(), handle));
    }

    /// Closes the scope and waits for every watcher to finish.
    pub async fn close(&self) {
        self.closed.cancel(format!("scope {} closed", self.name));

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        for (name, result) in names.into_iter().zip(results) {
            if let Err(join_error) = result {
                warn!(scope = %self.name, watcher = %name, "Cancellation watcher failed: {}", join_error);
            }
        }
        debug!(scope = %self.name, "Cancellation scope closed");
    }

    /// Returns the number of watchers not yet joined.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Returns the parent token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.parent
    }
}

impl Drop for CancellationScope {
    fn drop(&mut self) {
        self.closed.cancel("scope dropped");
    }
}

impl std::fmt::Debug for CancellationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationScope")
            .field("name", &self.name)
            .field("watcher_count", &self.watcher_count())
            .field("cancelled", &self.parent.is_cancelled())
            .finish()
    }
}
