//! The multi-stage test step.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::{PhaseSequencer, Step};
use crate::api::{ImageSource, JobSpec, MultiStageTestConfiguration, Parameters, StepLink};
use crate::cancellation::CancellationToken;
use crate::config::ExecutorConfig;
use crate::core::Phase;
use crate::errors::{AggregateError, ConfigurationError, MultiStageError};
use crate::notifier::TestCase;
use crate::pod::{PodClient, PodRunner, PodSynthesizer, SecretClient, MULTI_STAGE_TEST_LABEL};
use crate::recorder::DryLogger;

/// Parameter naming the release the cluster is installed from.
const RELEASE_IMAGE_INITIAL: &str = "RELEASE_IMAGE_INITIAL";
/// Parameter naming the release under test.
const RELEASE_IMAGE_LATEST: &str = "RELEASE_IMAGE_LATEST";

/// Runs a multi-stage test: pre steps, then test steps if every pre step
/// succeeded, then post steps regardless.
///
/// Every step runs in its own pod. A per-invocation secret named after the
/// test is recreated before the first pod and mounted into every pod so
/// steps can hand data to later steps.
pub struct MultiStageTestStep {
    test: MultiStageTestConfiguration,
    config: ExecutorConfig,
    params: Arc<dyn Parameters>,
    pod_client: Arc<dyn PodClient>,
    secret_client: Arc<dyn SecretClient>,
    job: JobSpec,
    dry: Option<Arc<dyn DryLogger>>,
    subtests: Vec<TestCase>,
}

impl MultiStageTestStep {
    /// Creates the step.
    #[must_use]
    pub fn new(
        test: MultiStageTestConfiguration,
        config: ExecutorConfig,
        params: Arc<dyn Parameters>,
        pod_client: Arc<dyn PodClient>,
        secret_client: Arc<dyn SecretClient>,
        job: JobSpec,
    ) -> Self {
        Self {
            test,
            config,
            params,
            pod_client,
            secret_client,
            job,
            dry: None,
            subtests: Vec::new(),
        }
    }

    /// Switches to dry-run mode: objects are recorded instead of created.
    #[must_use]
    pub fn dry_run(mut self, logger: Arc<dyn DryLogger>) -> Self {
        self.dry = Some(logger);
        self
    }

    /// Verifies the profile secret exists and resolves the release images.
    async fn resolve_profile(&self) -> Result<Option<(String, String)>, ConfigurationError> {
        if self.test.cluster_profile.is_none() {
            return Ok(None);
        }
        let secret = PodSynthesizer::profile_secret_name(&self.test.as_);
        self.secret_client
            .get(&secret)
            .await
            .map_err(|source| ConfigurationError::MissingProfileSecret {
                name: secret.clone(),
                source,
            })?;

        let resolve = |name: &str| {
            self.params
                .get(name)
                .map_err(|e| ConfigurationError::UnresolvedParameter {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
        };
        Ok(Some((resolve(RELEASE_IMAGE_INITIAL)?, resolve(RELEASE_IMAGE_LATEST)?)))
    }

    /// Deletes and recreates the results secret.
    async fn create_results_secret(&self) -> Result<(), MultiStageError> {
        let name = &self.test.as_;
        let mut labels = self.job.labels();
        labels.insert(MULTI_STAGE_TEST_LABEL.to_string(), name.clone());
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.job.namespace.clone()),
                labels: Some(labels),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };

        if let Some(dry) = &self.dry {
            dry.record("Secret", name, &secret);
            return Ok(());
        }

        let secret_error = |source| MultiStageError::ResultsSecret {
            name: name.clone(),
            source,
        };
        match self.secret_client.delete(name).await {
            Ok(()) => debug!(secret = %name, "Deleted previous results secret"),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(secret_error(e)),
        }
        self.secret_client.create(&secret).await.map_err(secret_error)?;
        info!(secret = %name, namespace = %self.job.namespace, "Created results secret");
        Ok(())
    }
}

#[async_trait]
impl Step for MultiStageTestStep {
    async fn run(&mut self, ctx: Arc<CancellationToken>) -> Result<(), MultiStageError> {
        self.subtests.clear();
        let release = self.resolve_profile().await?;
        self.create_results_secret().await?;

        let (errors, subtests) = {
            let name = self.test.as_.as_str();
            let description = self.description();
            let mut synth = PodSynthesizer::new(name, &self.config, &self.job);
            if let (Some(profile), Some((initial, latest))) = (self.test.cluster_profile, release) {
                synth = synth.with_profile(profile, initial, latest);
            }
            let runner = PodRunner::new(self.pod_client.clone(), name, self.config.poll_interval())
                .with_artifact_root(self.config.artifact_dir.clone())
                .with_dry_logger(self.dry.clone());
            let sequencer = PhaseSequencer::new(name, &description, &runner, self.pod_client.clone());

            let mut errors = AggregateError::new();
            let mut subtests = Vec::new();
            match sequencer
                .run_phase(&ctx, Phase::Pre, &synth, &self.test.pre, &mut subtests)
                .await
            {
                Ok(()) => {
                    if let Err(e) = sequencer
                        .run_phase(&ctx, Phase::Test, &synth, &self.test.test, &mut subtests)
                        .await
                    {
                        errors.push(e);
                    }
                }
                Err(e) => errors.push(e),
            }
            if let Err(e) = sequencer
                .run_phase(&ctx, Phase::Post, &synth, &self.test.post, &mut subtests)
                .await
            {
                errors.push(e);
            }
            (errors, subtests)
        };

        self.subtests = subtests;
        errors.into_result().map_err(MultiStageError::from)
    }

    fn requires(&self) -> Vec<StepLink> {
        let mut internal = BTreeSet::new();
        let mut needs_images = false;
        let mut needs_release = false;
        for step in self.test.all_steps().filter(|s| !s.from.is_empty()) {
            match self.config.images.classify(&step.from) {
                ImageSource::Pipeline(tag) => {
                    internal.insert(tag);
                }
                ImageSource::Build(_) => needs_images = true,
                ImageSource::Release(_) => needs_release = true,
            }
        }

        let mut links: Vec<StepLink> = internal
            .into_iter()
            .map(|tag| StepLink::internal_image(&self.config.pipeline_image_stream, tag))
            .collect();
        if needs_images {
            links.push(StepLink::ImagesReady);
        }
        if needs_release {
            links.push(StepLink::ReleaseImages);
        }
        if self.test.cluster_profile.is_some() {
            for param in [RELEASE_IMAGE_INITIAL, RELEASE_IMAGE_LATEST] {
                links.extend(self.params.links(param));
            }
        }
        links
    }

    fn name(&self) -> &str {
        &self.test.as_
    }

    fn description(&self) -> String {
        format!("Run multi-stage test {}", self.test.as_)
    }

    fn subtests(&self) -> Vec<TestCase> {
        self.subtests.clone()
    }
}

impl std::fmt::Debug for MultiStageTestStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiStageTestStep")
            .field("test", &self.test.as_)
            .field("namespace", &self.job.namespace)
            .field("dry", &self.dry.is_some())
            .field("subtests", &self.subtests.len())
            .finish_non_exhaustive()
    }
}
