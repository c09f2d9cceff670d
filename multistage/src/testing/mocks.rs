//! In-memory cluster clients for testing.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStatus, Pod, PodStatus,
    Secret,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Notify;

use crate::errors::ClientError;
use crate::pod::{PodClient, SecretClient};

/// How a fake pod behaves once created.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PodOutcome {
    /// Runs for one poll, then every container exits 0.
    #[default]
    Succeed,
    /// Runs for one poll, then the step container exits 1 with the message.
    Fail(String),
    /// Runs forever.
    Hang,
    /// Runs for one poll, then the step container exits 0 while the
    /// other containers keep running.
    StepExited,
}

#[derive(Debug)]
struct FakePod {
    pod: Pod,
    polls: usize,
}

#[derive(Debug, Default)]
struct PodState {
    pods: BTreeMap<String, FakePod>,
    outcomes: HashMap<String, PodOutcome>,
    fail_create: HashSet<String>,
    created: Vec<String>,
    deleted: Vec<String>,
    collections_deleted: Vec<String>,
    execs: Vec<ExecCall>,
    exec_outputs: HashMap<String, Vec<u8>>,
    hanging_execs: HashSet<String>,
}

/// One recorded `exec` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    /// The pod name.
    pub pod: String,
    /// The container name.
    pub container: String,
    /// The command.
    pub command: Vec<String>,
}

/// A pod client simulating pods in memory.
///
/// Pods report `Running` on their first poll and reach the scripted
/// [`PodOutcome`] on the next one.
#[derive(Debug, Default)]
pub struct FakePodClient {
    state: Mutex<PodState>,
    created_signal: Notify,
}

impl FakePodClient {
    /// Creates a client where every pod succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the outcome of a pod.
    #[must_use]
    pub fn with_outcome(self, pod: impl Into<String>, outcome: PodOutcome) -> Self {
        self.state.lock().outcomes.insert(pod.into(), outcome);
        self
    }

    /// Makes creation of a pod fail.
    #[must_use]
    pub fn with_create_failure(self, pod: impl Into<String>) -> Self {
        self.state.lock().fail_create.insert(pod.into());
        self
    }

    /// Sets the output of exec calls whose command starts with `program`.
    #[must_use]
    pub fn with_exec_output(self, program: impl Into<String>, output: Vec<u8>) -> Self {
        self.state.lock().exec_outputs.insert(program.into(), output);
        self
    }

    /// Makes exec calls whose command starts with `program` never complete.
    #[must_use]
    pub fn with_hanging_exec(self, program: impl Into<String>) -> Self {
        self.state.lock().hanging_execs.insert(program.into());
        self
    }

    /// Seeds an existing pod, e.g. a leftover from an earlier attempt.
    #[must_use]
    pub fn with_existing_pod(self, pod: Pod) -> Self {
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.state.lock().pods.insert(name, FakePod { pod, polls: 0 });
        self
    }

    /// Names of created pods, in creation order.
    #[must_use]
    pub fn created(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    /// The created pod objects still present, by name.
    #[must_use]
    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.state.lock().pods.get(name).map(|p| p.pod.clone())
    }

    /// Names of pods deleted by name.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    /// Label selectors passed to `delete_collection`.
    #[must_use]
    pub fn collections_deleted(&self) -> Vec<String> {
        self.state.lock().collections_deleted.clone()
    }

    /// Recorded exec calls.
    #[must_use]
    pub fn execs(&self) -> Vec<ExecCall> {
        self.state.lock().execs.clone()
    }

    /// Waits until a pod with the given name was created.
    pub async fn wait_for_pod(&self, name: &str) {
        loop {
            let notified = self.created_signal.notified();
            if self.state.lock().created.iter().any(|n| n == name) {
                return;
            }
            notified.await;
        }
    }
}

fn running(name: &str) -> ContainerStatus {
    ContainerStatus {
        name: name.to_string(),
        state: Some(ContainerState {
            running: Some(ContainerStateRunning {
                started_at: Some(Time(Utc::now())),
            }),
            ..ContainerState::default()
        }),
        ..ContainerStatus::default()
    }
}

fn terminated(name: &str, exit_code: i32, message: Option<String>) -> ContainerStatus {
    ContainerStatus {
        name: name.to_string(),
        state: Some(ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code,
                reason: Some(if exit_code == 0 { "Completed" } else { "Error" }.to_string()),
                message,
                started_at: Some(Time(Utc::now())),
                finished_at: Some(Time(Utc::now())),
                ..ContainerStateTerminated::default()
            }),
            ..ContainerState::default()
        }),
        ..ContainerStatus::default()
    }
}

fn container_names(pod: &Pod) -> Vec<String> {
    pod.spec
        .as_ref()
        .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

fn simulate(fake: &FakePod, outcome: &PodOutcome) -> PodStatus {
    let names = container_names(&fake.pod);
    let (phase, statuses): (&str, Vec<ContainerStatus>) = match outcome {
        _ if fake.polls <= 1 => ("Running", names.iter().map(|n| running(n)).collect()),
        PodOutcome::Hang => ("Running", names.iter().map(|n| running(n)).collect()),
        PodOutcome::StepExited => (
            "Running",
            names
                .iter()
                .enumerate()
                .map(|(i, n)| if i == 0 { terminated(n, 0, None) } else { running(n) })
                .collect(),
        ),
        PodOutcome::Succeed => ("Succeeded", names.iter().map(|n| terminated(n, 0, None)).collect()),
        PodOutcome::Fail(message) => (
            "Failed",
            names
                .iter()
                .enumerate()
                .map(|(i, n)| {
                    if i == 0 {
                        terminated(n, 1, Some(message.clone()))
                    } else {
                        terminated(n, 0, None)
                    }
                })
                .collect(),
        ),
    };
    PodStatus {
        phase: Some(phase.to_string()),
        container_statuses: Some(statuses),
        ..PodStatus::default()
    }
}

fn matches_selector(pod: &Pod, selector: &str) -> bool {
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    selector.split(',').all(|term| match term.split_once('=') {
        Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
        None => false,
    })
}

#[async_trait]
impl PodClient for FakePodClient {
    async fn create(&self, pod: &Pod) -> Result<Pod, ClientError> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        {
            let mut state = self.state.lock();
            if state.fail_create.contains(&name) {
                return Err(ClientError::Api(format!("admission webhook denied pod {name}")));
            }
            if state.pods.contains_key(&name) {
                return Err(ClientError::AlreadyExists { kind: "pod", name });
            }
            state.pods.insert(
                name.clone(),
                FakePod {
                    pod: pod.clone(),
                    polls: 0,
                },
            );
            state.created.push(name);
        }
        self.created_signal.notify_waiters();
        Ok(pod.clone())
    }

    async fn get(&self, name: &str) -> Result<Pod, ClientError> {
        let mut state = self.state.lock();
        let outcome = state.outcomes.get(name).cloned().unwrap_or_default();
        let fake = state
            .pods
            .get_mut(name)
            .ok_or_else(|| ClientError::not_found("pod", name))?;
        fake.polls += 1;
        let mut pod = fake.pod.clone();
        pod.status = Some(simulate(fake, &outcome));
        Ok(pod)
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state
            .pods
            .remove(name)
            .ok_or_else(|| ClientError::not_found("pod", name))?;
        state.deleted.push(name.to_string());
        Ok(())
    }

    async fn delete_collection(&self, label_selector: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.pods.retain(|_, fake| !matches_selector(&fake.pod, label_selector));
        state.collections_deleted.push(label_selector.to_string());
        Ok(())
    }

    async fn exec(&self, pod: &str, container: &str, command: &[String]) -> Result<Vec<u8>, ClientError> {
        let program = command.first().map(String::as_str).unwrap_or_default();
        let (hangs, output) = {
            let mut state = self.state.lock();
            state.execs.push(ExecCall {
                pod: pod.to_string(),
                container: container.to_string(),
                command: command.to_vec(),
            });
            (
                state.hanging_execs.contains(program),
                state.exec_outputs.get(program).cloned().unwrap_or_default(),
            )
        };
        if hangs {
            std::future::pending::<()>().await;
        }
        Ok(output)
    }
}

#[derive(Debug, Default)]
struct SecretState {
    secrets: BTreeMap<String, Secret>,
    ops: Vec<String>,
    fail_create: bool,
}

/// A secret client storing secrets in memory and logging every call.
#[derive(Debug, Default)]
pub struct FakeSecretClient {
    state: Mutex<SecretState>,
}

impl FakeSecretClient {
    /// Creates a client with no secrets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a secret.
    #[must_use]
    pub fn with_secret(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut secret = Secret::default();
        secret.metadata.name = Some(name.clone());
        self.state.lock().secrets.insert(name, secret);
        self
    }

    /// Makes every create fail.
    #[must_use]
    pub fn with_create_failure(self) -> Self {
        self.state.lock().fail_create = true;
        self
    }

    /// Calls made so far, as `"<verb> <name>"`.
    #[must_use]
    pub fn ops(&self) -> Vec<String> {
        self.state.lock().ops.clone()
    }

    /// Returns a stored secret.
    #[must_use]
    pub fn secret(&self, name: &str) -> Option<Secret> {
        self.state.lock().secrets.get(name).cloned()
    }
}

#[async_trait]
impl SecretClient for FakeSecretClient {
    async fn get(&self, name: &str) -> Result<Secret, ClientError> {
        let mut state = self.state.lock();
        state.ops.push(format!("get {name}"));
        state
            .secrets
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::not_found("secret", name))
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, ClientError> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        let mut state = self.state.lock();
        state.ops.push(format!("create {name}"));
        if state.fail_create {
            return Err(ClientError::Api("secrets are forbidden".to_string()));
        }
        if state.secrets.contains_key(&name) {
            return Err(ClientError::AlreadyExists { kind: "secret", name });
        }
        state.secrets.insert(name, secret.clone());
        Ok(secret.clone())
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.ops.push(format!("delete {name}"));
        state
            .secrets
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("secret", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};

    fn pod(name: &str, label: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.labels = Some(BTreeMap::from([("test".to_string(), label.to_string())]));
        pod.spec = Some(PodSpec {
            containers: vec![Container {
                name: "step".to_string(),
                ..Container::default()
            }],
            ..PodSpec::default()
        });
        pod
    }

    fn phase(pod: &Pod) -> Option<String> {
        pod.status.as_ref().and_then(|s| s.phase.clone())
    }

    #[tokio::test]
    async fn test_pod_progression() {
        let client = FakePodClient::new().with_outcome("b", PodOutcome::Fail("boom".to_string()));
        client.create(&pod("a", "x")).await.unwrap();
        client.create(&pod("b", "x")).await.unwrap();

        assert_eq!(phase(&client.get("a").await.unwrap()).as_deref(), Some("Running"));
        assert_eq!(phase(&client.get("a").await.unwrap()).as_deref(), Some("Succeeded"));
        client.get("b").await.unwrap();
        assert_eq!(phase(&client.get("b").await.unwrap()).as_deref(), Some("Failed"));
    }

    #[tokio::test]
    async fn test_delete_collection_by_label() {
        let client = FakePodClient::new();
        client.create(&pod("a", "x")).await.unwrap();
        client.create(&pod("b", "y")).await.unwrap();

        client.delete_collection("test=x").await.unwrap();
        assert!(client.get("a").await.unwrap_err().is_not_found());
        assert!(client.get("b").await.is_ok());
        assert_eq!(client.collections_deleted(), vec!["test=x".to_string()]);
    }

    #[tokio::test]
    async fn test_secret_ops() {
        let client = FakeSecretClient::new().with_secret("e2e");
        assert!(client.delete("missing").await.unwrap_err().is_not_found());
        client.delete("e2e").await.unwrap();
        assert!(client.get("e2e").await.unwrap_err().is_not_found());
        assert_eq!(client.ops(), vec!["delete missing", "delete e2e", "get e2e"]);
    }
}
