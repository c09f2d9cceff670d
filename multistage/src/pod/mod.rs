//! Pods: synthesis, cluster clients and lifecycle execution.

mod client;
mod cluster;
mod runner;
mod synth;

pub use cluster::{KubePodClient, KubeSecretClient};
pub use client::{PodClient, SecretClient};
pub use runner::{PodRunner, StepPod};
pub use synth::{
    PodSynthesizer, CLUSTER_PROFILE_MOUNT_PATH, MULTI_STAGE_TEST_LABEL, SECRET_MOUNT_PATH,
    SECRET_WRAPPER_DIR,
};
