//! Identity of the CI job an invocation runs for.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label marking objects created by the CI system.
pub const CREATED_BY_CI_LABEL: &str = "created-by-ci";
/// Label carrying the job name.
pub const JOB_LABEL: &str = "job";
/// Label carrying the build id.
pub const BUILD_ID_LABEL: &str = "build-id";
/// Label carrying the prow job id.
pub const PROW_JOB_ID_LABEL: &str = "prow.k8s.io/id";

/// The job an invocation belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Namespace all pods and secrets are created in.
    pub namespace: String,
    /// Job name.
    pub job: String,
    /// Build id of this run of the job.
    #[serde(default)]
    pub build_id: String,
    /// Prow job id.
    #[serde(default)]
    pub prow_job_id: String,
    /// The object that owns everything created for this job.
    #[serde(skip)]
    pub owner: Option<OwnerReference>,
}

impl JobSpec {
    /// Creates a job spec.
    #[must_use]
    pub fn new(namespace: impl Into<String>, job: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            job: job.into(),
            ..Self::default()
        }
    }

    /// Sets the build id.
    #[must_use]
    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = build_id.into();
        self
    }

    /// Sets the prow job id.
    #[must_use]
    pub fn with_prow_job_id(mut self, id: impl Into<String>) -> Self {
        self.prow_job_id = id.into();
        self
    }

    /// Sets the owner reference.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Returns a short, stable hash of the job name.
    #[must_use]
    pub fn job_name_hash(&self) -> String {
        let digest = format!("{:x}", Md5::digest(self.job.as_bytes()));
        digest[..5].to_string()
    }

    /// Returns the labels identifying this job on created objects.
    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(CREATED_BY_CI_LABEL.to_string(), "true".to_string());
        if !self.job.is_empty() {
            labels.insert(JOB_LABEL.to_string(), self.job.clone());
        }
        if !self.build_id.is_empty() {
            labels.insert(BUILD_ID_LABEL.to_string(), self.build_id.clone());
        }
        if !self.prow_job_id.is_empty() {
            labels.insert(PROW_JOB_ID_LABEL.to_string(), self.prow_job_id.clone());
        }
        labels
    }
}
