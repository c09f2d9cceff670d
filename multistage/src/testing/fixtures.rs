//! Fixtures for executor tests.

use std::sync::Arc;
use std::time::Duration;

use crate::api::{JobSpec, LiteralTestStep};
use crate::config::ExecutorConfig;
use crate::recorder::{CollectingDryLogger, DryLogger};

/// Namespace used by fixtures.
pub const TEST_NAMESPACE: &str = "ci-op-abcdef";

/// A job spec for a periodic e2e job.
#[must_use]
pub fn job_spec() -> JobSpec {
    JobSpec::new(TEST_NAMESPACE, "periodic-ci-e2e").with_build_id("1234")
}

/// A configuration polling every millisecond.
#[must_use]
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig::new().with_poll_interval(Duration::from_millis(1))
}

/// A step running `commands` in the `src` pipeline image.
#[must_use]
pub fn step(as_: &str, commands: &str) -> LiteralTestStep {
    LiteralTestStep::new(as_, "src", commands)
}

/// A collecting dry logger and the same logger as a trait object.
#[must_use]
pub fn dry_logger() -> (Arc<CollectingDryLogger>, Arc<dyn DryLogger>) {
    let collecting = Arc::new(CollectingDryLogger::new());
    let logger: Arc<dyn DryLogger> = collecting.clone();
    (collecting, logger)
}
