//! Turns container lifecycle events into test cases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use super::{ContainerNotifier, TestCase};
use crate::core::ContainerEvent;

#[derive(Debug, Default)]
struct Recorded {
    /// Started containers in start order.
    started: Vec<(String, DateTime<Utc>)>,
    /// Containers that already have a record.
    finished: HashSet<String>,
    cases: Vec<TestCase>,
    cancelled: bool,
}

impl Recorded {
    fn is_started(&self, container: &str) -> bool {
        self.started.iter().any(|(name, _)| name == container)
    }

    fn start_of(&self, container: &str) -> Option<DateTime<Utc>> {
        self.started
            .iter()
            .find(|(name, _)| name == container)
            .map(|(_, at)| *at)
    }

    fn abort(&mut self, container: &str, started: DateTime<Utc>, now: DateTime<Utc>) {
        self.finished.insert(container.to_string());
        self.cases.push(TestCase::failed(
            case_name(container),
            seconds_between(started, now),
            format!("container {container} was still running when the test was cancelled"),
        ));
    }
}

fn case_name(container: &str) -> String {
    format!("container {container}")
}

#[allow(clippy::cast_precision_loss)]
fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}

/// A notifier recording one test case per container.
///
/// Every event is forwarded to the nested notifier first. Each container
/// that starts ends up with exactly one record: from its terminal event, or
/// from [`ContainerNotifier::cancel`] if it never finished.
pub struct TestCaseNotifier {
    nested: Arc<dyn ContainerNotifier>,
    state: Mutex<Recorded>,
}

impl TestCaseNotifier {
    /// Wraps a nested notifier.
    #[must_use]
    pub fn new(nested: Arc<dyn ContainerNotifier>) -> Self {
        Self {
            nested,
            state: Mutex::new(Recorded::default()),
        }
    }

    /// Returns the recorded test cases with `prefix` prepended to each name.
    #[must_use]
    pub fn subtests(&self, prefix: &str) -> Vec<TestCase> {
        self.state
            .lock()
            .cases
            .iter()
            .map(|case| TestCase {
                name: format!("{prefix}{}", case.name),
                ..case.clone()
            })
            .collect()
    }

    /// Returns true once `cancel` was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }
}

#[async_trait]
impl ContainerNotifier for TestCaseNotifier {
    async fn on_container_event(&self, event: &ContainerEvent) {
        self.nested.on_container_event(event).await;

        let now = Utc::now();
        let mut state = self.state.lock();
        match event {
            ContainerEvent::Started { container, at, .. } => {
                if state.is_started(container) {
                    return;
                }
                let started = at.unwrap_or(now);
                state.started.push((container.clone(), started));
                if state.cancelled {
                    state.abort(container, started, now);
                }
            }
            ContainerEvent::Terminated {
                container,
                started_at,
                finished_at,
                exit_code,
                reason,
                message,
                ..
            } => {
                if state.finished.contains(container) {
                    return;
                }
                let started = started_at
                    .or_else(|| state.start_of(container))
                    .unwrap_or(now);
                if !state.is_started(container) {
                    state.started.push((container.clone(), started));
                }
                let duration = seconds_between(started, finished_at.unwrap_or(now));
                state.finished.insert(container.clone());

                let case = if *exit_code == 0 {
                    TestCase::passed(case_name(container), duration)
                } else {
                    let mut output = format!(
                        "container {container} exited with code {exit_code}, reason {}",
                        reason.as_deref().unwrap_or("Error")
                    );
                    if let Some(message) = message.as_deref().filter(|m| !m.is_empty()) {
                        output.push('\n');
                        output.push_str(message);
                    }
                    TestCase::failed(case_name(container), duration, output)
                };
                state.cases.push(case);
            }
        }
    }

    fn cancel(&self) {
        self.nested.cancel();

        let now = Utc::now();
        let mut state = self.state.lock();
        state.cancelled = true;
        let pending: Vec<_> = state
            .started
            .iter()
            .filter(|(name, _)| !state.finished.contains(name))
            .cloned()
            .collect();
        for (container, started) in pending {
            state.abort(&container, started, now);
        }
    }
}

impl std::fmt::Debug for TestCaseNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TestCaseNotifier")
            .field("started", &state.started.len())
            .field("recorded", &state.cases.len())
            .field("cancelled", &state.cancelled)
            .finish()
    }
}
