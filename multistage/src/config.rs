//! Executor configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::api::{PipelineImages, PIPELINE_IMAGE_STREAM};
use crate::resources::ResourcePresets;

/// Settings shared by every invocation of the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// How often a running pod is polled, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Image providing the secret-capturing launcher.
    #[serde(default = "default_secret_wrapper_image")]
    pub secret_wrapper_image: String,
    /// Image of the artifacts sidecar.
    #[serde(default = "default_artifacts_image")]
    pub artifacts_image: String,
    /// Image stream holding pipeline images.
    #[serde(default = "default_pipeline_image_stream")]
    pub pipeline_image_stream: String,
    /// Local directory artifacts are collected into. No collection when unset.
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
    /// Images produced by the pipeline.
    #[serde(default)]
    pub images: PipelineImages,
    /// Named resource presets.
    #[serde(default)]
    pub resource_presets: ResourcePresets,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_secret_wrapper_image() -> String {
    "registry.svc.ci.openshift.org/ci/secret-wrapper:latest".to_string()
}

fn default_artifacts_image() -> String {
    "busybox".to_string()
}

fn default_pipeline_image_stream() -> String {
    PIPELINE_IMAGE_STREAM.to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            secret_wrapper_image: default_secret_wrapper_image(),
            artifacts_image: default_artifacts_image(),
            pipeline_image_stream: default_pipeline_image_stream(),
            artifact_dir: None,
            images: PipelineImages::default(),
            resource_presets: ResourcePresets::default(),
        }
    }
}

impl ExecutorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the artifact directory.
    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    /// Sets the pipeline image registry.
    #[must_use]
    pub fn with_images(mut self, images: PipelineImages) -> Self {
        self.images = images;
        self
    }

    /// Sets the resource presets.
    #[must_use]
    pub fn with_resource_presets(mut self, presets: ResourcePresets) -> Self {
        self.resource_presets = presets;
        self
    }

    /// Sets the secret wrapper image.
    #[must_use]
    pub fn with_secret_wrapper_image(mut self, image: impl Into<String>) -> Self {
        self.secret_wrapper_image = image.into();
        self
    }

    /// Gets the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
