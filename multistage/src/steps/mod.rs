//! Steps the graph scheduler can run.
//!
//! A step declares what it needs and produces through [`StepLink`]s and is
//! run once by the scheduler after its requirements are met.

mod integration_tests;
mod multi_stage;
mod phase;

pub use multi_stage::MultiStageTestStep;
pub use phase::{PhasePolicy, PhaseSequencer};

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::api::{ParameterMap, StepLink};
use crate::cancellation::CancellationToken;
use crate::errors::MultiStageError;
use crate::notifier::TestCase;

/// Trait for steps of a CI pipeline.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Runs the step. Cancelling `ctx` interrupts it.
    async fn run(&mut self, ctx: Arc<CancellationToken>) -> Result<(), MultiStageError>;

    /// Links that must be satisfied before the step runs.
    fn requires(&self) -> Vec<StepLink>;

    /// Links the step satisfies once it ran.
    fn creates(&self) -> Vec<StepLink> {
        Vec::new()
    }

    /// Parameters the step provides to others, and the link gating them.
    fn provides(&self) -> (ParameterMap, Option<StepLink>) {
        (ParameterMap::new(), None)
    }

    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Returns a human-readable description.
    fn description(&self) -> String;

    /// Test results recorded by the last run.
    fn subtests(&self) -> Vec<TestCase> {
        Vec::new()
    }

    /// Returns true if the step's results already exist and it can be skipped.
    fn done(&self) -> Result<bool, MultiStageError> {
        Ok(false)
    }

    /// Inputs contributing to the step's identity.
    fn inputs(&self) -> Result<Vec<String>, MultiStageError> {
        Ok(Vec::new())
    }
}
