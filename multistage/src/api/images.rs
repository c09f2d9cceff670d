//! Classification of step image sources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The image stream holding images produced inside the pipeline.
pub const PIPELINE_IMAGE_STREAM: &str = "pipeline";

/// Tags every pipeline produces.
const WELL_KNOWN_PIPELINE_TAGS: [&str; 5] = ["root", "src", "bin", "test-bin", "rpms"];

/// Where a step's image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageSource {
    /// A tag of the pipeline image stream.
    Pipeline(String),
    /// An image built by one of the pipeline's build steps.
    Build(String),
    /// An image from the release under test.
    Release(String),
}

impl ImageSource {
    /// Returns the image reference a pod should use.
    #[must_use]
    pub fn image_ref(&self, pipeline_stream: &str) -> String {
        match self {
            Self::Pipeline(tag) => format!("{pipeline_stream}:{tag}"),
            Self::Build(name) | Self::Release(name) => name.clone(),
        }
    }
}

/// The registry of images a pipeline produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineImages {
    /// Tags of the pipeline image stream.
    #[serde(default)]
    pub pipeline: BTreeSet<String>,
    /// Images built by build steps.
    #[serde(default)]
    pub built: BTreeSet<String>,
}

impl Default for PipelineImages {
    fn default() -> Self {
        Self {
            pipeline: WELL_KNOWN_PIPELINE_TAGS.iter().map(ToString::to_string).collect(),
            built: BTreeSet::new(),
        }
    }
}

impl PipelineImages {
    /// Creates a registry with only the well-known pipeline tags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pipeline tag, e.g. a base image imported into the pipeline.
    #[must_use]
    pub fn with_pipeline_image(mut self, tag: impl Into<String>) -> Self {
        self.pipeline.insert(tag.into());
        self
    }

    /// Adds an image produced by a build step.
    #[must_use]
    pub fn with_built_image(mut self, name: impl Into<String>) -> Self {
        self.built.insert(name.into());
        self
    }

    /// Returns true if `name` is a tag of the pipeline image stream.
    #[must_use]
    pub fn is_pipeline_image(&self, name: &str) -> bool {
        self.pipeline.contains(name)
    }

    /// Returns true if `name` is produced by a build step.
    #[must_use]
    pub fn builds_image(&self, name: &str) -> bool {
        self.built.contains(name)
    }

    /// Classifies a step's `from`. Pipeline tags win over built images.
    #[must_use]
    pub fn classify(&self, from: &str) -> ImageSource {
        if self.is_pipeline_image(from) {
            ImageSource::Pipeline(from.to_string())
        } else if self.builds_image(from) {
            ImageSource::Build(from.to_string())
        } else {
            ImageSource::Release(from.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let images = PipelineImages::new()
            .with_pipeline_image("base")
            .with_built_image("tests");

        assert_eq!(images.classify("src"), ImageSource::Pipeline("src".to_string()));
        assert_eq!(images.classify("base"), ImageSource::Pipeline("base".to_string()));
        assert_eq!(images.classify("tests"), ImageSource::Build("tests".to_string()));
        assert_eq!(images.classify("installer"), ImageSource::Release("installer".to_string()));
    }

    #[test]
    fn test_image_ref() {
        assert_eq!(ImageSource::Pipeline("src".to_string()).image_ref(PIPELINE_IMAGE_STREAM), "pipeline:src");
        assert_eq!(ImageSource::Release("cli".to_string()).image_ref(PIPELINE_IMAGE_STREAM), "cli");
        assert_eq!(ImageSource::Build("tests".to_string()).image_ref("other"), "tests");
    }
}
