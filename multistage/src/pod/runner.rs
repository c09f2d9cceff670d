//! Pod lifecycle: create, watch, report.

use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PodClient;
use crate::cancellation::{CancellationScope, CancellationToken};
use crate::core::{ContainerEvent, PodPhase};
use crate::errors::{ClientError, ExecutionError, ExecutionErrorKind};
use crate::notifier::{ArtifactWorker, ContainerNotifier, NopNotifier, TestCaseNotifier};
use crate::recorder::DryLogger;

/// A synthesized pod together with the step it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPod {
    /// The step name, also the name of the step container.
    pub step: String,
    /// The pod to submit.
    pub pod: Pod,
    /// Whether the pod carries an artifacts sidecar.
    pub has_artifacts: bool,
}

impl StepPod {
    /// Returns the pod name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.pod.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Tracks which container transitions were already reported.
#[derive(Debug, Default)]
struct ContainerTracker {
    started: HashSet<String>,
    terminated: HashSet<String>,
}

impl ContainerTracker {
    /// Returns the events not yet reported for the given pod state.
    fn diff(&mut self, pod_name: &str, pod: &Pod) -> Vec<ContainerEvent> {
        let mut events = Vec::new();
        let statuses = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_deref())
            .unwrap_or_default();

        for status in statuses {
            let Some(state) = status.state.as_ref() else {
                continue;
            };
            if let Some(running) = &state.running {
                if self.started.insert(status.name.clone()) {
                    events.push(ContainerEvent::started(
                        pod_name,
                        &status.name,
                        running.started_at.as_ref().map(|t| t.0),
                    ));
                }
            }
            if let Some(terminated) = &state.terminated {
                let started_at = terminated.started_at.as_ref().map(|t| t.0);
                if self.started.insert(status.name.clone()) {
                    events.push(ContainerEvent::started(pod_name, &status.name, started_at));
                }
                if self.terminated.insert(status.name.clone()) {
                    events.push(ContainerEvent::Terminated {
                        pod: pod_name.to_string(),
                        container: status.name.clone(),
                        started_at,
                        finished_at: terminated.finished_at.as_ref().map(|t| t.0),
                        exit_code: terminated.exit_code,
                        reason: terminated.reason.clone(),
                        message: terminated.message.clone(),
                    });
                }
            }
        }
        events
    }
}

fn failed_exit(status: &ContainerStatus) -> Option<String> {
    let terminated = status.state.as_ref()?.terminated.as_ref()?;
    if terminated.exit_code == 0 {
        return None;
    }
    let mut line = format!(
        "container {:?} exited with code {}, reason {}",
        status.name,
        terminated.exit_code,
        terminated.reason.as_deref().unwrap_or("Error")
    );
    if let Some(message) = terminated.message.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        line.push_str(": ");
        line.push_str(message);
    }
    Some(line)
}

/// Describes why a pod failed from its container statuses.
fn describe_failure(pod: &Pod) -> String {
    let status = pod.status.as_ref();
    let lines: Vec<String> = status
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default()
        .iter()
        .filter_map(failed_exit)
        .collect();
    if !lines.is_empty() {
        return lines.join("\n");
    }
    match status.and_then(|s| s.message.as_deref().or(s.reason.as_deref())) {
        Some(message) => format!("the pod failed: {message}"),
        None => "the pod failed".to_string(),
    }
}

/// Runs synthesized pods to completion on the cluster.
pub struct PodRunner {
    client: Arc<dyn PodClient>,
    test: String,
    poll_interval: Duration,
    artifact_root: Option<PathBuf>,
    dry: Option<Arc<dyn DryLogger>>,
}

impl PodRunner {
    /// Creates a runner for the pods of one test.
    #[must_use]
    pub fn new(client: Arc<dyn PodClient>, test: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            client,
            test: test.into(),
            poll_interval,
            artifact_root: None,
            dry: None,
        }
    }

    /// Collects artifacts under `<root>/<test>/<step>`.
    #[must_use]
    pub fn with_artifact_root(mut self, root: Option<PathBuf>) -> Self {
        self.artifact_root = root;
        self
    }

    /// Records pods instead of creating them.
    #[must_use]
    pub fn with_dry_logger(mut self, logger: Option<Arc<dyn DryLogger>>) -> Self {
        self.dry = logger;
        self
    }

    /// Returns true in dry-run mode.
    #[must_use]
    pub fn is_dry(&self) -> bool {
        self.dry.is_some()
    }

    /// Builds the notifier chain for one pod.
    #[must_use]
    pub fn notifier_for(&self, step: &StepPod) -> Arc<TestCaseNotifier> {
        let nested: Arc<dyn ContainerNotifier> = if step.has_artifacts && !self.is_dry() {
            let dir = self
                .artifact_root
                .as_ref()
                .map(|root| root.join(&self.test).join(&step.step));
            Arc::new(ArtifactWorker::new(self.client.clone(), step.name(), &step.step, dir))
        } else {
            Arc::new(NopNotifier)
        };
        Arc::new(TestCaseNotifier::new(nested))
    }

    fn error(&self, step: &StepPod, kind: ExecutionErrorKind) -> ExecutionError {
        ExecutionError {
            test: self.test.clone(),
            step: step.step.clone(),
            pod: step.name().to_string(),
            kind,
        }
    }

    fn cancelled(&self, ctx: &CancellationToken, step: &StepPod) -> ExecutionError {
        let reason = ctx.reason().unwrap_or_else(|| "cancelled".to_string());
        self.error(step, ExecutionErrorKind::Cancelled(reason))
    }

    /// Runs one pod to completion, forwarding container events to `notifier`.
    ///
    /// If `ctx` is cancelled while the pod runs, the notifier is cancelled
    /// and waiting stops. The pod itself is left for phase cleanup.
    pub async fn run(
        &self,
        ctx: &Arc<CancellationToken>,
        step: &StepPod,
        notifier: Arc<TestCaseNotifier>,
    ) -> Result<(), ExecutionError> {
        let name = step.name();
        if let Some(dry) = &self.dry {
            dry.record("Pod", name, &step.pod);
            return Ok(());
        }
        if ctx.is_cancelled() {
            return Err(self.cancelled(ctx, step));
        }

        info!(test = %self.test, step = %step.step, pod = %name, "Executing pod");
        self.create_or_restart(&step.pod, name)
            .await
            .map_err(|e| self.error(step, ExecutionErrorKind::Create(e)))?;

        let scope = CancellationScope::new(format!("pod {name}"), ctx.clone());
        let on_cancel = notifier.clone();
        scope.on_cancel("finalize test cases", move || async move {
            on_cancel.cancel();
        });

        let result = self.wait(ctx, step, notifier.as_ref()).await;
        scope.close().await;

        match &result {
            Ok(()) => info!(test = %self.test, pod = %name, "Pod succeeded"),
            Err(e) => warn!(test = %self.test, pod = %name, "Pod did not succeed: {}", e),
        }
        result
    }

    /// Deletes a leftover pod of the same name, waits until it is gone,
    /// then creates the pod.
    async fn create_or_restart(&self, pod: &Pod, name: &str) -> Result<(), ClientError> {
        match self.client.delete(name).await {
            Ok(()) => {
                debug!(pod = %name, "Deleted existing pod, waiting for it to go away");
                loop {
                    match self.client.get(name).await {
                        Err(e) if e.is_not_found() => break,
                        Err(e) => return Err(e),
                        Ok(_) => tokio::time::sleep(self.poll_interval).await,
                    }
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.client.create(pod).await.map(|_| ())
    }

    async fn wait(
        &self,
        ctx: &Arc<CancellationToken>,
        step: &StepPod,
        notifier: &dyn ContainerNotifier,
    ) -> Result<(), ExecutionError> {
        let name = step.name();
        let mut tracker = ContainerTracker::default();
        loop {
            let polled = tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(self.cancelled(ctx, step)),
                polled = self.client.get(name) => polled,
            };
            let pod = match polled {
                Ok(pod) => pod,
                Err(e) if e.is_not_found() => return Err(self.error(step, ExecutionErrorKind::Deleted)),
                Err(e) => return Err(self.error(step, ExecutionErrorKind::Wait(e))),
            };

            // Notifiers may exec into the pod, so they race cancellation too.
            for event in tracker.diff(name, &pod) {
                tokio::select! {
                    biased;
                    () = ctx.cancelled() => return Err(self.cancelled(ctx, step)),
                    () = notifier.on_container_event(&event) => {}
                }
            }

            let phase = PodPhase::parse(pod.status.as_ref().and_then(|s| s.phase.as_deref()));
            match phase {
                PodPhase::Succeeded => return Ok(()),
                PodPhase::Failed => {
                    return Err(self.error(step, ExecutionErrorKind::Failed(describe_failure(&pod))))
                }
                _ => debug!(pod = %name, phase = %phase, "Pod not finished yet"),
            }

            tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(self.cancelled(ctx, step)),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

impl std::fmt::Debug for PodRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodRunner")
            .field("test", &self.test)
            .field("poll_interval", &self.poll_interval)
            .field("artifact_root", &self.artifact_root)
            .field("dry", &self.dry.is_some())
            .finish_non_exhaustive()
    }
}
