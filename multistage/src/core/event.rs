//! Container lifecycle events forwarded to notifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lifecycle transition of one container in a pod.
///
/// The runner emits `Started` before `Terminated` for every container it
/// observes, even when both transitions are seen in the same poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContainerEvent {
    /// The container started running.
    Started {
        /// The pod name.
        pod: String,
        /// The container name.
        container: String,
        /// When the container started, if reported.
        at: Option<DateTime<Utc>>,
    },
    /// The container exited.
    Terminated {
        /// The pod name.
        pod: String,
        /// The container name.
        container: String,
        /// When the container started, if reported.
        started_at: Option<DateTime<Utc>>,
        /// When the container finished, if reported.
        finished_at: Option<DateTime<Utc>>,
        /// The exit code.
        exit_code: i32,
        /// Short machine-readable reason.
        reason: Option<String>,
        /// Termination message.
        message: Option<String>,
    },
}

impl ContainerEvent {
    /// Creates a "started" event.
    #[must_use]
    pub fn started(pod: &str, container: &str, at: Option<DateTime<Utc>>) -> Self {
        Self::Started {
            pod: pod.to_string(),
            container: container.to_string(),
            at,
        }
    }

    /// Creates a "terminated" event with no timing or message details.
    #[must_use]
    pub fn terminated(pod: &str, container: &str, exit_code: i32) -> Self {
        Self::Terminated {
            pod: pod.to_string(),
            container: container.to_string(),
            started_at: None,
            finished_at: None,
            exit_code,
            reason: None,
            message: None,
        }
    }

    /// Returns the pod name.
    #[must_use]
    pub fn pod(&self) -> &str {
        match self {
            Self::Started { pod, .. } | Self::Terminated { pod, .. } => pod,
        }
    }

    /// Returns the container name.
    #[must_use]
    pub fn container(&self) -> &str {
        match self {
            Self::Started { container, .. } | Self::Terminated { container, .. } => container,
        }
    }

    /// Returns true for terminal events.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }
}
