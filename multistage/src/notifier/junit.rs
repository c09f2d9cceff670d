//! Structured test results.

use serde::{Deserialize, Serialize};

/// One pass/fail record, shaped after a JUnit test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Test name.
    pub name: String,
    /// Duration in seconds.
    pub duration_seconds: f64,
    /// Failure output. `None` means the test passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl TestCase {
    /// Creates a passing test case.
    #[must_use]
    pub fn passed(name: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            name: name.into(),
            duration_seconds,
            failure: None,
        }
    }

    /// Creates a failing test case.
    #[must_use]
    pub fn failed(name: impl Into<String>, duration_seconds: f64, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration_seconds,
            failure: Some(output.into()),
        }
    }

    /// Returns true if the test failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}
