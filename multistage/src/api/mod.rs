//! Declarative inputs of a multi-stage test and the dependency contract.
//!
//! These types describe *what* runs; the `steps` module decides *how*.

mod images;
mod job;
mod links;
mod params;
mod profile;
mod test_step;

pub use images::{ImageSource, PipelineImages, PIPELINE_IMAGE_STREAM};
pub use job::{JobSpec, BUILD_ID_LABEL, CREATED_BY_CI_LABEL, JOB_LABEL, PROW_JOB_ID_LABEL};
pub use links::StepLink;
pub use params::{DeferredParameters, ParameterError, ParameterMap, Parameters};
pub use profile::ClusterProfile;
pub use test_step::{LiteralTestStep, MultiStageTestConfiguration};

#[cfg(test)]
pub use params::MockParameters;
