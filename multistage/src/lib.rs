//! # Multistage
//!
//! Executes multi-stage tests as a sequence of Kubernetes pods.
//!
//! A multi-stage test is made of three phases of literal steps:
//!
//! - **pre**: sets up the environment, stops at the first failure
//! - **test**: runs only when every pre step succeeded
//! - **post**: always runs and reports every failure
//!
//! Each step runs in its own pod built from the step definition, the job
//! spec and an optional cluster profile. Artifacts are copied out of a
//! sidecar and every container is recorded as a JUnit test case.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use multistage::prelude::*;
//!
//! let client = kube::Client::try_default().await?;
//! let job = JobSpec::new("ci-op-1234", "periodic-e2e");
//! let mut step = MultiStageTestStep::new(
//!     test,
//!     ExecutorConfig::default(),
//!     Arc::new(params),
//!     Arc::new(KubePodClient::new(client.clone(), &job.namespace)),
//!     Arc::new(KubeSecretClient::new(client, &job.namespace)),
//!     job,
//! );
//! step.run(Arc::new(CancellationToken::new())).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod api;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod notifier;
pub mod observability;
pub mod pod;
pub mod recorder;
pub mod resources;
pub mod steps;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::api::{
        ClusterProfile, DeferredParameters, ImageSource, JobSpec, LiteralTestStep,
        MultiStageTestConfiguration, ParameterMap, Parameters, PipelineImages, StepLink,
    };
    pub use crate::cancellation::{CancellationScope, CancellationToken};
    pub use crate::config::ExecutorConfig;
    pub use crate::core::{ContainerEvent, Phase, PodPhase};
    pub use crate::errors::{
        AggregateError, ClientError, ConfigurationError, ExecutionError, MultiStageError,
        SynthesisError,
    };
    pub use crate::notifier::{ContainerNotifier, TestCase, TestCaseNotifier};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pod::{KubePodClient, KubeSecretClient, PodClient, SecretClient};
    pub use crate::recorder::{CollectingDryLogger, DryLogger, TracingDryLogger};
    pub use crate::resources::ResourcePresets;
    pub use crate::steps::{MultiStageTestStep, Step};
}
