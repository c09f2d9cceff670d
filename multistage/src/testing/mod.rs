//! Testing utilities for the executor.
//!
//! This module provides:
//! - In-memory pod and secret clients with scripted pod outcomes
//! - Fixtures for job specs, configurations and steps

mod fixtures;
mod mocks;

pub use fixtures::{dry_logger, fast_config, job_spec, step, TEST_NAMESPACE};
pub use mocks::{ExecCall, FakePodClient, FakeSecretClient, PodOutcome};
