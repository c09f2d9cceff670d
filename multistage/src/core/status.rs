//! Phase and pod status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three ordered phases of a multi-stage test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Setup steps. Fail-fast.
    Pre,
    /// Test steps. Fail-fast, skipped when setup failed.
    Test,
    /// Cleanup steps. Always run.
    Post,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Self; 3] = [Self::Pre, Self::Test, Self::Post];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Test => write!(f, "test"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// The lifecycle phase of a pod as reported in its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    /// Accepted but not all containers are running.
    Pending,
    /// At least one container is running.
    Running,
    /// All containers terminated successfully.
    Succeeded,
    /// All containers terminated and at least one failed.
    Failed,
    /// The state could not be obtained.
    Unknown,
}

impl Default for PodPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl PodPhase {
    /// Parses the `status.phase` string of a pod. A missing phase is `Pending`.
    #[must_use]
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            None | Some("Pending") => Self::Pending,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            Some(_) => Self::Unknown,
        }
    }

    /// Returns true if the pod will not change phase again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Pre.to_string(), "pre");
        assert_eq!(Phase::Test.to_string(), "test");
        assert_eq!(Phase::Post.to_string(), "post");
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::Pre < Phase::Test);
        assert!(Phase::Test < Phase::Post);
        assert_eq!(Phase::ALL[0], Phase::Pre);
    }

    #[test]
    fn test_pod_phase_parse() {
        assert_eq!(PodPhase::parse(None), PodPhase::Pending);
        assert_eq!(PodPhase::parse(Some("Running")), PodPhase::Running);
        assert_eq!(PodPhase::parse(Some("Succeeded")), PodPhase::Succeeded);
        assert_eq!(PodPhase::parse(Some("Failed")), PodPhase::Failed);
        assert_eq!(PodPhase::parse(Some("Evicted")), PodPhase::Unknown);
    }

    #[test]
    fn test_pod_phase_is_terminal() {
        assert!(PodPhase::Succeeded.is_terminal());
        assert!(PodPhase::Failed.is_terminal());
        assert!(!PodPhase::Running.is_terminal());
        assert!(!PodPhase::Pending.is_terminal());
    }

    #[test]
    fn test_phase_serialize() {
        let json = serde_json::to_string(&Phase::Post).unwrap();
        assert_eq!(json, r#""post""#);
    }
}
