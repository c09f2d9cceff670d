//! Deterministic pod synthesis for test steps.

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, Pod, PodSpec, ResourceRequirements, SecretVolumeSource,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use super::StepPod;
use crate::api::{ClusterProfile, JobSpec, LiteralTestStep};
use crate::config::ExecutorConfig;
use crate::errors::{AggregateError, SynthesisError, SynthesisErrorKind};
use crate::notifier::{ARTIFACTS_CONTAINER, ARTIFACTS_DONE_FILE, ARTIFACTS_MOUNT_PATH};

/// Label carrying the test name on every pod of a multi-stage test.
pub const MULTI_STAGE_TEST_LABEL: &str = "ci.openshift.io/multi-stage-test";
/// Where the cluster profile secret is mounted.
pub const CLUSTER_PROFILE_MOUNT_PATH: &str = "/var/run/secrets/ci.openshift.io/cluster-profile";
/// Where the per-invocation results secret is mounted.
pub const SECRET_MOUNT_PATH: &str = "/var/run/secrets/ci.openshift.io/multi-stage";
/// Where the secret wrapper binary is copied to.
pub const SECRET_WRAPPER_DIR: &str = "/tmp/secret-wrapper";

/// Annotation carrying the serialized job spec.
const JOB_SPEC_ANNOTATION: &str = "ci.openshift.io/job-spec";
const SECRET_WRAPPER_VOLUME: &str = "secret-wrapper";
const SECRET_WRAPPER_INIT_CONTAINER: &str = "cp-secret-wrapper";
const CLUSTER_PROFILE_VOLUME: &str = "cluster-profile";
const ARTIFACTS_VOLUME: &str = "artifacts";
/// Volumes whose names the results secret volume must not take.
const RESERVED_VOLUME_NAMES: [&str; 3] = [ARTIFACTS_VOLUME, SECRET_WRAPPER_VOLUME, CLUSTER_PROFILE_VOLUME];

/// Release images handed to steps of a test with a cluster profile.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProfileEnv {
    profile: ClusterProfile,
    release_initial: String,
    release_latest: String,
}

/// Builds one pod per step of a test.
///
/// Synthesis is pure: the same inputs always produce the same pods.
#[derive(Debug, Clone)]
pub struct PodSynthesizer<'a> {
    test: &'a str,
    config: &'a ExecutorConfig,
    job: &'a JobSpec,
    profile: Option<ProfileEnv>,
}

impl<'a> PodSynthesizer<'a> {
    /// Creates a synthesizer for the named test.
    #[must_use]
    pub fn new(test: &'a str, config: &'a ExecutorConfig, job: &'a JobSpec) -> Self {
        Self {
            test,
            config,
            job,
            profile: None,
        }
    }

    /// Wires the cluster profile and the resolved release images into every pod.
    #[must_use]
    pub fn with_profile(
        mut self,
        profile: ClusterProfile,
        release_initial: impl Into<String>,
        release_latest: impl Into<String>,
    ) -> Self {
        self.profile = Some(ProfileEnv {
            profile,
            release_initial: release_initial.into(),
            release_latest: release_latest.into(),
        });
        self
    }

    /// Returns the name of the pod running `step`.
    #[must_use]
    pub fn pod_name(&self, step: &LiteralTestStep) -> String {
        format!("{}-{}", self.test, step.as_)
    }

    /// Returns the name of the secret holding the cluster profile.
    #[must_use]
    pub fn profile_secret_name(test: &str) -> String {
        format!("{test}-cluster-profile")
    }

    /// Synthesizes the pods of one phase, in declaration order.
    ///
    /// Every step is attempted. If any of them fails, all failures are
    /// returned together and no pod is returned.
    pub fn generate_pods(&self, steps: &[LiteralTestStep]) -> Result<Vec<StepPod>, AggregateError> {
        let mut pods = Vec::with_capacity(steps.len());
        let mut errors = AggregateError::new();
        for step in steps {
            match self.generate_pod(step) {
                Ok(pod) => pods.push(pod),
                Err(e) => errors.push(e),
            }
        }
        errors.into_result().map(|()| pods)
    }

    /// Synthesizes the pod for one step.
    pub fn generate_pod(&self, step: &LiteralTestStep) -> Result<StepPod, SynthesisError> {
        let name = self.pod_name(step);
        if RESERVED_VOLUME_NAMES.iter().any(|reserved| *reserved == self.test) {
            return Err(SynthesisError::new(
                &step.as_,
                &name,
                SynthesisErrorKind::ReservedName(self.test.to_string()),
            ));
        }
        if step.from.trim().is_empty() {
            return Err(SynthesisError::new(
                &step.as_,
                &name,
                SynthesisErrorKind::Image(format!("step {:?} does not name an image", step.as_)),
            ));
        }
        let image = self
            .config
            .images
            .classify(&step.from)
            .image_ref(&self.config.pipeline_image_stream);
        let resources = self
            .config
            .resource_presets
            .resources_for(&step.resources)
            .map_err(|e| SynthesisError::new(&step.as_, &name, e))?;

        let mut pod = self.base_pod(step, &name, image, resources);
        if let Some(dir) = &step.artifact_dir {
            add_artifacts(&mut pod, dir, &self.config.artifacts_image);
        }
        self.add_secret_wrapper(&mut pod);
        self.add_job_env(&mut pod);
        if let Some(owner) = &self.job.owner {
            pod.metadata.owner_references.get_or_insert_with(Vec::new).push(owner.clone());
        }
        if let Some(profile) = &self.profile {
            self.add_profile(&mut pod, profile);
        }
        add_results_secret(&mut pod, self.test);

        Ok(StepPod {
            step: step.as_.clone(),
            pod,
            has_artifacts: step.artifact_dir.is_some(),
        })
    }

    fn base_pod(&self, step: &LiteralTestStep, name: &str, image: String, resources: ResourceRequirements) -> Pod {
        let mut labels = self.job.labels();
        labels.insert(MULTI_STAGE_TEST_LABEL.to_string(), self.test.to_string());

        let mut annotations = BTreeMap::new();
        if let Ok(job_spec) = serde_json::to_string(self.job) {
            annotations.insert(JOB_SPEC_ANNOTATION.to_string(), job_spec);
        }

        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(self.job.namespace.clone()),
                labels: Some(labels),
                annotations: Some(annotations),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                restart_policy: Some("Never".to_string()),
                containers: vec![Container {
                    name: step.as_.clone(),
                    image: Some(image),
                    command: Some(vec![
                        "/bin/bash".to_string(),
                        "-c".to_string(),
                        format!("#!/bin/bash\nset -eu\n{}", step.commands),
                    ]),
                    resources: Some(resources),
                    termination_message_policy: Some("FallbackToLogsOnError".to_string()),
                    ..Container::default()
                }],
                ..PodSpec::default()
            }),
            status: None,
        }
    }

    fn add_secret_wrapper(&self, pod: &mut Pod) {
        let mount = VolumeMount {
            name: SECRET_WRAPPER_VOLUME.to_string(),
            mount_path: SECRET_WRAPPER_DIR.to_string(),
            ..VolumeMount::default()
        };
        let wrapper = format!("{SECRET_WRAPPER_DIR}/secret-wrapper");
        let Some(spec) = pod.spec.as_mut() else {
            return;
        };

        spec.volumes.get_or_insert_with(Vec::new).push(Volume {
            name: SECRET_WRAPPER_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Volume::default()
        });
        spec.init_containers.get_or_insert_with(Vec::new).push(Container {
            name: SECRET_WRAPPER_INIT_CONTAINER.to_string(),
            image: Some(self.config.secret_wrapper_image.clone()),
            command: Some(vec!["cp".to_string()]),
            args: Some(vec!["/bin/secret-wrapper".to_string(), wrapper.clone()]),
            volume_mounts: Some(vec![mount.clone()]),
            termination_message_policy: Some("FallbackToLogsOnError".to_string()),
            ..Container::default()
        });

        let Some(container) = spec.containers.first_mut() else {
            return;
        };
        let mut args = container.command.take().unwrap_or_default();
        args.extend(container.args.take().unwrap_or_default());
        container.command = Some(vec![wrapper]);
        container.args = Some(args);
        container.volume_mounts.get_or_insert_with(Vec::new).push(mount);
    }

    fn add_job_env(&self, pod: &mut Pod) {
        push_env(pod, "NAMESPACE", &self.job.namespace);
        push_env(pod, "JOB_NAME_SAFE", &self.test.replace('_', "-"));
        push_env(pod, "JOB_NAME_HASH", &self.job.job_name_hash());
    }

    fn add_profile(&self, pod: &mut Pod, profile: &ProfileEnv) {
        add_secret_volume(
            pod,
            CLUSTER_PROFILE_VOLUME,
            &Self::profile_secret_name(self.test),
            CLUSTER_PROFILE_MOUNT_PATH,
        );
        push_env(pod, "CLUSTER_TYPE", profile.profile.cluster_type());
        push_env(pod, "KUBECONFIG", &format!("{SECRET_MOUNT_PATH}/kubeconfig"));
        push_env(pod, "RELEASE_IMAGE_INITIAL", &profile.release_initial);
        push_env(pod, "RELEASE_IMAGE_LATEST", &profile.release_latest);
    }
}

fn step_container(pod: &mut Pod) -> Option<&mut Container> {
    pod.spec.as_mut().and_then(|spec| spec.containers.first_mut())
}

fn push_env(pod: &mut Pod, name: &str, value: &str) {
    if let Some(container) = step_container(pod) {
        container.env.get_or_insert_with(Vec::new).push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        });
    }
}

fn add_secret_volume(pod: &mut Pod, volume: &str, secret: &str, mount_path: &str) {
    let Some(spec) = pod.spec.as_mut() else {
        return;
    };
    spec.volumes.get_or_insert_with(Vec::new).push(Volume {
        name: volume.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            ..SecretVolumeSource::default()
        }),
        ..Volume::default()
    });
    if let Some(container) = spec.containers.first_mut() {
        container.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
            name: volume.to_string(),
            mount_path: mount_path.to_string(),
            ..VolumeMount::default()
        });
    }
}

fn add_results_secret(pod: &mut Pod, test: &str) {
    add_secret_volume(pod, test, test, SECRET_MOUNT_PATH);
}

/// Idles until the artifacts were collected.
fn sidecar_script() -> String {
    format!(
        r#"#!/bin/sh
set -eu
trap 'kill $(jobs -p); exit 0' TERM

echo "Waiting for artifacts to be collected"
while [ ! -f {ARTIFACTS_DONE_FILE} ]; do
	sleep 5 & wait
done
echo "Artifacts collected, exiting"
"#
    )
}

fn add_artifacts(pod: &mut Pod, artifact_dir: &str, image: &str) {
    let Some(spec) = pod.spec.as_mut() else {
        return;
    };
    spec.volumes.get_or_insert_with(Vec::new).push(Volume {
        name: ARTIFACTS_VOLUME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Volume::default()
    });
    if let Some(container) = spec.containers.first_mut() {
        container.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
            name: ARTIFACTS_VOLUME.to_string(),
            mount_path: artifact_dir.to_string(),
            ..VolumeMount::default()
        });
        container.env.get_or_insert_with(Vec::new).push(EnvVar {
            name: "ARTIFACT_DIR".to_string(),
            value: Some(artifact_dir.to_string()),
            value_from: None,
        });
    }

    let requests = BTreeMap::from([
        ("cpu".to_string(), Quantity("10m".to_string())),
        ("memory".to_string(), Quantity("10Mi".to_string())),
    ]);
    spec.containers.push(Container {
        name: ARTIFACTS_CONTAINER.to_string(),
        image: Some(image.to_string()),
        command: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            sidecar_script(),
        ]),
        resources: Some(ResourceRequirements {
            requests: Some(requests),
            ..ResourceRequirements::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: ARTIFACTS_VOLUME.to_string(),
            mount_path: ARTIFACTS_MOUNT_PATH.to_string(),
            ..VolumeMount::default()
        }]),
        termination_message_policy: Some("FallbackToLogsOnError".to_string()),
        ..Container::default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PipelineImages;
    use crate::errors::MultiStageError;
    use crate::resources::ResourceRequest;
    use crate::testing::{job_spec, step};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use pretty_assertions::assert_eq;

    fn env(pod: &Pod) -> Vec<(String, String)> {
        pod.spec.as_ref().unwrap().containers[0]
            .env
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|e| (e.name, e.value.unwrap_or_default()))
            .collect()
    }

    fn env_names(pod: &Pod) -> Vec<String> {
        env(pod).into_iter().map(|(name, _)| name).collect()
    }

    fn volume_names(pod: &Pod) -> Vec<String> {
        pod.spec
            .as_ref()
            .unwrap()
            .volumes
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.name)
            .collect()
    }

    fn mounts(container: &Container) -> Vec<(String, String)> {
        container
            .volume_mounts
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|m| (m.name, m.mount_path))
            .collect()
    }

    #[test]
    fn test_base_pod() {
        let config = ExecutorConfig::default();
        let job = job_spec();
        let synth = PodSynthesizer::new("e2e", &config, &job);

        let step_pod = synth.generate_pod(&step("setup", "make setup")).unwrap();
        let pod = &step_pod.pod;
        assert_eq!(step_pod.step, "setup");
        assert_eq!(step_pod.name(), "e2e-setup");
        assert!(!step_pod.has_artifacts);

        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get(MULTI_STAGE_TEST_LABEL).map(String::as_str), Some("e2e"));
        assert_eq!(labels.get("created-by-ci").map(String::as_str), Some("true"));
        let annotation = &pod.metadata.annotations.as_ref().unwrap()[JOB_SPEC_ANNOTATION];
        assert!(annotation.contains("periodic-ci-e2e"));

        let spec = pod.spec.as_ref().unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        let container = &spec.containers[0];
        assert_eq!(container.name, "setup");
        assert_eq!(container.image.as_deref(), Some("pipeline:src"));
        assert_eq!(
            container.command.clone().unwrap(),
            vec!["/tmp/secret-wrapper/secret-wrapper".to_string()]
        );
        assert_eq!(
            container.args.clone().unwrap(),
            vec![
                "/bin/bash".to_string(),
                "-c".to_string(),
                "#!/bin/bash\nset -eu\nmake setup".to_string()
            ]
        );
        assert_eq!(container.termination_message_policy.as_deref(), Some("FallbackToLogsOnError"));

        let init = &spec.init_containers.as_ref().unwrap()[0];
        assert_eq!(init.name, SECRET_WRAPPER_INIT_CONTAINER);
        assert_eq!(init.image.as_deref(), Some(config.secret_wrapper_image.as_str()));
        assert_eq!(
            init.args.clone().unwrap(),
            vec!["/bin/secret-wrapper".to_string(), "/tmp/secret-wrapper/secret-wrapper".to_string()]
        );

        assert_eq!(volume_names(pod), vec!["secret-wrapper", "e2e"]);
        assert_eq!(
            mounts(container),
            vec![
                ("secret-wrapper".to_string(), SECRET_WRAPPER_DIR.to_string()),
                ("e2e".to_string(), SECRET_MOUNT_PATH.to_string()),
            ]
        );
    }

    #[test]
    fn test_job_env() {
        let config = ExecutorConfig::default();
        let job = job_spec();
        let synth = PodSynthesizer::new("e2e_aws", &config, &job);
        let pod = synth.generate_pod(&step("test", "true")).unwrap().pod;

        assert_eq!(
            env(&pod),
            vec![
                ("NAMESPACE".to_string(), job.namespace.clone()),
                ("JOB_NAME_SAFE".to_string(), "e2e-aws".to_string()),
                ("JOB_NAME_HASH".to_string(), job.job_name_hash()),
            ]
        );
    }

    #[test]
    fn test_image_rewriting() {
        let config = ExecutorConfig::default()
            .with_images(PipelineImages::new().with_pipeline_image("base").with_built_image("tests"));
        let job = job_spec();
        let synth = PodSynthesizer::new("e2e", &config, &job);

        let image = |from: &str| {
            let pod = synth
                .generate_pod(&LiteralTestStep::new("s", from, "true"))
                .unwrap()
                .pod;
            pod.spec.unwrap().containers[0].image.clone().unwrap()
        };
        assert_eq!(image("base"), "pipeline:base");
        assert_eq!(image("tests"), "tests");
        assert_eq!(image("installer"), "installer");
        assert_eq!(image("quay.io/openshift/cli:latest"), "quay.io/openshift/cli:latest");
    }

    #[test]
    fn test_profile_wiring() {
        let config = ExecutorConfig::default();
        let job = job_spec();
        let synth = PodSynthesizer::new("e2e", &config, &job).with_profile(
            ClusterProfile::AwsAtomic,
            "registry/release:initial",
            "registry/release:latest",
        );
        let pod = synth.generate_pod(&step("install", "openshift-install")).unwrap().pod;

        assert_eq!(
            env_names(&pod),
            vec![
                "NAMESPACE",
                "JOB_NAME_SAFE",
                "JOB_NAME_HASH",
                "CLUSTER_TYPE",
                "KUBECONFIG",
                "RELEASE_IMAGE_INITIAL",
                "RELEASE_IMAGE_LATEST",
            ]
        );
        let env = env(&pod);
        assert_eq!(env[3].1, "aws");
        assert_eq!(env[4].1, "/var/run/secrets/ci.openshift.io/multi-stage/kubeconfig");
        assert_eq!(env[6].1, "registry/release:latest");

        assert_eq!(volume_names(&pod), vec!["secret-wrapper", "cluster-profile", "e2e"]);
        let volumes = pod.spec.as_ref().unwrap().volumes.clone().unwrap();
        assert_eq!(
            volumes[1].secret.as_ref().unwrap().secret_name.as_deref(),
            Some("e2e-cluster-profile")
        );
        let container = &pod.spec.as_ref().unwrap().containers[0];
        assert!(mounts(container).contains(&("cluster-profile".to_string(), CLUSTER_PROFILE_MOUNT_PATH.to_string())));
    }

    #[test]
    fn test_artifacts_sidecar() {
        let config = ExecutorConfig::default();
        let job = job_spec();
        let synth = PodSynthesizer::new("e2e", &config, &job);
        let step_pod = synth
            .generate_pod(&step("test", "make e2e").with_artifact_dir("/tmp/artifacts-out"))
            .unwrap();
        assert!(step_pod.has_artifacts);

        let spec = step_pod.pod.spec.as_ref().unwrap();
        assert_eq!(spec.containers.len(), 2);
        let sidecar = &spec.containers[1];
        assert_eq!(sidecar.name, ARTIFACTS_CONTAINER);
        assert_eq!(sidecar.image.as_deref(), Some("busybox"));
        assert_eq!(mounts(sidecar), vec![("artifacts".to_string(), ARTIFACTS_MOUNT_PATH.to_string())]);

        let main = &spec.containers[0];
        assert!(mounts(main).contains(&("artifacts".to_string(), "/tmp/artifacts-out".to_string())));
        assert_eq!(env_names(&step_pod.pod)[0], "ARTIFACT_DIR");
    }

    #[test]
    fn test_owner_reference() {
        let config = ExecutorConfig::default();
        let job = job_spec().with_owner(OwnerReference {
            api_version: "ci.openshift.io/v1".to_string(),
            kind: "ProwJob".to_string(),
            name: "periodic-ci-e2e".to_string(),
            uid: "4f1c".to_string(),
            ..OwnerReference::default()
        });
        let synth = PodSynthesizer::new("e2e", &config, &job);
        let pod = synth.generate_pod(&step("test", "true")).unwrap().pod;

        let owners = pod.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "ProwJob");
    }

    #[test]
    fn test_resources_applied() {
        let config = ExecutorConfig::default();
        let job = job_spec();
        let synth = PodSynthesizer::new("e2e", &config, &job);
        let pod = synth
            .generate_pod(&step("test", "true").with_resources(ResourceRequest::preset("small")))
            .unwrap()
            .pod;

        let resources = pod.spec.unwrap().containers[0].resources.clone().unwrap();
        assert_eq!(resources.requests.unwrap()["cpu"], Quantity("100m".to_string()));
    }

    #[test]
    fn test_synthesis_errors_are_aggregated() {
        let config = ExecutorConfig::default();
        let job = job_spec();
        let synth = PodSynthesizer::new("e2e", &config, &job);
        let steps = vec![
            step("ok", "true"),
            step("bad-quantity", "true").with_resources(ResourceRequest::default().with_limit("memory", "lots")),
            LiteralTestStep::new("no-image", "", "true"),
        ];

        let err = synth.generate_pods(&steps).unwrap_err();
        assert_eq!(err.len(), 2);
        let message = err.to_string();
        assert!(message.contains("e2e-bad-quantity"));
        assert!(message.contains("invalid quantity \"lots\""));
        assert!(message.contains("e2e-no-image"));
    }

    #[test]
    fn test_reserved_test_names_rejected() {
        let config = ExecutorConfig::default();
        let job = job_spec();
        for test in ["artifacts", "secret-wrapper", "cluster-profile"] {
            let synth = PodSynthesizer::new(test, &config, &job);
            let err = synth.generate_pods(&[step("a", "true"), step("b", "true")]).unwrap_err();
            assert_eq!(err.len(), 2);
            assert!(err
                .iter()
                .all(|e| matches!(e, MultiStageError::Synthesis(s) if s.kind == SynthesisErrorKind::ReservedName(test.to_string()))));
        }
    }

    #[test]
    fn test_results_volume_is_unique() {
        let config = ExecutorConfig::default();
        let job = job_spec();
        let synth = PodSynthesizer::new("e2e", &config, &job).with_profile(ClusterProfile::Gcp, "initial", "latest");
        let pod = synth.generate_pod(&step("test", "true").with_artifact_dir("/out")).unwrap().pod;

        let mut names = volume_names(&pod);
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_generate_pods_in_order() {
        let config = ExecutorConfig::default();
        let job = job_spec();
        let synth = PodSynthesizer::new("e2e", &config, &job);
        let pods = synth
            .generate_pods(&[step("a", "true"), step("b", "true")])
            .unwrap();
        let names: Vec<_> = pods.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["e2e-a", "e2e-b"]);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let config = ExecutorConfig::default();
        let job = job_spec();
        let synth = PodSynthesizer::new("e2e", &config, &job);
        let s = step("test", "make").with_artifact_dir("/out");
        assert_eq!(synth.generate_pod(&s).unwrap().pod, synth.generate_pod(&s).unwrap().pod);
    }
}
