//! Dependency links exchanged with the graph scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A declarative marker of something a step needs or produces.
///
/// The scheduler orders steps by matching one step's `requires()` against
/// other steps' `creates()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepLink {
    /// A tag in an image stream produced inside this pipeline.
    InternalImage {
        /// The image stream.
        stream: String,
        /// The tag.
        tag: String,
    },
    /// Every image built by the pipeline is available.
    ImagesReady,
    /// The release images are available.
    ReleaseImages,
    /// A specific release payload image is available.
    ReleasePayloadImage {
        /// The payload name, e.g. `initial` or `latest`.
        name: String,
    },
}

impl StepLink {
    /// Creates a link to an internal image stream tag.
    #[must_use]
    pub fn internal_image(stream: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::InternalImage {
            stream: stream.into(),
            tag: tag.into(),
        }
    }

    /// Creates a link to a release payload image.
    #[must_use]
    pub fn release_payload_image(name: impl Into<String>) -> Self {
        Self::ReleasePayloadImage { name: name.into() }
    }

    /// Returns true if `other` fulfils this requirement.
    #[must_use]
    pub fn satisfied_by(&self, other: &Self) -> bool {
        self == other
    }
}

impl fmt::Display for StepLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InternalImage { stream, tag } => write!(f, "internal image {stream}:{tag}"),
            Self::ImagesReady => write!(f, "images ready"),
            Self::ReleaseImages => write!(f, "release images"),
            Self::ReleasePayloadImage { name } => write!(f, "release payload image {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfied_by() {
        let want = StepLink::internal_image("pipeline", "src");
        assert!(want.satisfied_by(&StepLink::internal_image("pipeline", "src")));
        assert!(!want.satisfied_by(&StepLink::internal_image("pipeline", "bin")));
        assert!(!StepLink::ImagesReady.satisfied_by(&StepLink::ReleaseImages));
    }

    #[test]
    fn test_display() {
        assert_eq!(StepLink::internal_image("pipeline", "src").to_string(), "internal image pipeline:src");
        assert_eq!(StepLink::release_payload_image("latest").to_string(), "release payload image latest");
    }
}
