//! Sequential execution of the steps of one phase.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::LiteralTestStep;
use crate::cancellation::{CancellationScope, CancellationToken};
use crate::core::Phase;
use crate::errors::{AggregateError, CleanupError, MultiStageError};
use crate::notifier::TestCase;
use crate::pod::{PodClient, PodRunner, PodSynthesizer, MULTI_STAGE_TEST_LABEL};

/// How a phase reacts to a failing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PhasePolicy {
    /// Stop at the first failing step.
    #[default]
    ShortCircuit,
    /// Run every step and collect all failures.
    RunAll,
}

impl PhasePolicy {
    /// Returns the policy a phase runs under.
    #[must_use]
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::Pre | Phase::Test => Self::ShortCircuit,
            Phase::Post => Self::RunAll,
        }
    }
}

/// Runs the phases of one test, one step at a time.
pub struct PhaseSequencer<'a> {
    test: &'a str,
    description: &'a str,
    runner: &'a PodRunner,
    client: Arc<dyn PodClient>,
}

impl<'a> PhaseSequencer<'a> {
    /// Creates a sequencer. `description` prefixes recorded test names.
    #[must_use]
    pub fn new(test: &'a str, description: &'a str, runner: &'a PodRunner, client: Arc<dyn PodClient>) -> Self {
        Self {
            test,
            description,
            runner,
            client,
        }
    }

    /// Runs one phase.
    ///
    /// All pods are synthesized before any is submitted. Every error is
    /// tagged with the phase; test cases of every pod that ran are appended
    /// to `subtests`, whatever the outcome. If `ctx` is cancelled while the
    /// phase runs, the test's pods are deleted by label.
    pub async fn run_phase(
        &self,
        ctx: &Arc<CancellationToken>,
        phase: Phase,
        synth: &PodSynthesizer<'_>,
        steps: &[LiteralTestStep],
        subtests: &mut Vec<TestCase>,
    ) -> Result<(), AggregateError> {
        let policy = PhasePolicy::for_phase(phase);
        let pods = synth
            .generate_pods(steps)
            .map_err(|errors| self.tag(phase, errors.flatten()))?;
        if pods.is_empty() {
            return Ok(());
        }
        info!(test = %self.test, phase = %phase, steps = pods.len(), "Running phase");

        let scope = CancellationScope::new(format!("{} {phase}", self.test), ctx.clone());
        if !self.runner.is_dry() {
            let client = self.client.clone();
            let selector = format!("{MULTI_STAGE_TEST_LABEL}={}", self.test);
            scope.on_cancel("delete test pods", move || async move {
                info!(selector = %selector, "Cancelled, deleting test pods");
                if let Err(source) = client.delete_collection(&selector).await {
                    let error = CleanupError { selector, source };
                    warn!("Cleanup after cancellation failed: {}", error);
                }
            });
        }

        let mut errors = Vec::new();
        for pod in &pods {
            let notifier = self.runner.notifier_for(pod);
            let result = self.runner.run(ctx, pod, notifier.clone()).await;
            subtests.extend(notifier.subtests(&format!("{} - {} ", self.description, pod.name())));
            if let Err(e) = result {
                errors.push(MultiStageError::from(e));
                if policy == PhasePolicy::ShortCircuit {
                    break;
                }
            }
        }
        scope.close().await;

        if errors.is_empty() {
            Ok(())
        } else {
            Err(self.tag(phase, errors))
        }
    }

    fn tag(&self, phase: Phase, errors: Vec<MultiStageError>) -> AggregateError {
        errors.into_iter().map(|e| e.in_phase(self.test, phase)).collect()
    }
}

impl std::fmt::Debug for PhaseSequencer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseSequencer")
            .field("test", &self.test)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}
