//! Observers of container lifecycle events.
//!
//! Notifiers are layered by decoration: a [`TestCaseNotifier`] wraps an
//! [`ArtifactWorker`] or a [`NopNotifier`] and forwards every event to it
//! before recording its own results.

mod artifacts;
mod junit;
mod test_case;

pub use artifacts::{ArtifactWorker, ARTIFACTS_CONTAINER, ARTIFACTS_DONE_FILE, ARTIFACTS_MOUNT_PATH};
pub use junit::TestCase;
pub use test_case::TestCaseNotifier;

use async_trait::async_trait;

use crate::core::ContainerEvent;

/// Trait for observers of a pod's container events.
#[async_trait]
pub trait ContainerNotifier: Send + Sync {
    /// Handles one container lifecycle event.
    async fn on_container_event(&self, event: &ContainerEvent);

    /// Finalizes the notifier after the invocation was cancelled.
    fn cancel(&self) {}
}

/// A notifier that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopNotifier;

#[async_trait]
impl ContainerNotifier for NopNotifier {
    async fn on_container_event(&self, _event: &ContainerEvent) {}
}
