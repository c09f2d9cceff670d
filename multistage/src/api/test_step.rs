//! Test definition types.

use serde::{Deserialize, Serialize};

use super::ClusterProfile;
use crate::resources::ResourceRequest;

/// One fully resolved step of a multi-stage test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteralTestStep {
    /// Step name, unique within the test.
    #[serde(rename = "as")]
    pub as_: String,
    /// Image source: a pipeline image tag, a built image or a release image.
    pub from: String,
    /// Shell body run under `set -eu`.
    pub commands: String,
    /// Resource request for the step container.
    #[serde(default)]
    pub resources: ResourceRequest,
    /// Directory in the step container whose contents are collected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<String>,
}

impl LiteralTestStep {
    /// Creates a step with no resources and no artifacts.
    #[must_use]
    pub fn new(as_: impl Into<String>, from: impl Into<String>, commands: impl Into<String>) -> Self {
        Self {
            as_: as_.into(),
            from: from.into(),
            commands: commands.into(),
            resources: ResourceRequest::default(),
            artifact_dir: None,
        }
    }

    /// Sets the resource request.
    #[must_use]
    pub fn with_resources(mut self, resources: ResourceRequest) -> Self {
        self.resources = resources;
        self
    }

    /// Sets the artifact directory.
    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<String>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }
}

/// A multi-stage test: three ordered lists of steps and an optional profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiStageTestConfiguration {
    /// Test name. It also names the results secret volume, so `artifacts`,
    /// `secret-wrapper` and `cluster-profile` are rejected.
    #[serde(rename = "as")]
    pub as_: String,
    /// Credential bundle granting access to a target cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_profile: Option<ClusterProfile>,
    /// Setup steps.
    #[serde(default)]
    pub pre: Vec<LiteralTestStep>,
    /// Test steps.
    #[serde(default)]
    pub test: Vec<LiteralTestStep>,
    /// Cleanup steps.
    #[serde(default)]
    pub post: Vec<LiteralTestStep>,
}

impl MultiStageTestConfiguration {
    /// Creates an empty test.
    #[must_use]
    pub fn new(as_: impl Into<String>) -> Self {
        Self {
            as_: as_.into(),
            ..Self::default()
        }
    }

    /// Iterates over every step in phase order.
    pub fn all_steps(&self) -> impl Iterator<Item = &LiteralTestStep> {
        self.pre.iter().chain(&self.test).chain(&self.post)
    }
}
