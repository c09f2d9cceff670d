//! Error types for the multi-stage executor.
//!
//! Errors are grouped by the point at which they abort work: configuration
//! errors abort the whole invocation, synthesis errors abort a phase before
//! any pod is submitted, execution errors are attributed to one step, and
//! cleanup errors are only ever logged.

use std::fmt;

use thiserror::Error;

use crate::core::Phase;

/// The main error type for multi-stage operations.
#[derive(Debug, Error)]
pub enum MultiStageError {
    /// The invocation could not start.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A pod could not be synthesized for a step.
    #[error("{0}")]
    Synthesis(#[from] SynthesisError),

    /// A step's pod could not be executed or failed.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// The per-invocation results secret could not be recreated.
    #[error("failed to create secret {name:?}: {source}")]
    ResultsSecret {
        /// The secret name.
        name: String,
        /// The underlying client error.
        source: ClientError,
    },

    /// An error tagged with the phase it was raised in.
    #[error("{test:?} {phase} steps failed: {source}")]
    InPhase {
        /// The test name.
        test: String,
        /// The phase.
        phase: Phase,
        /// The underlying error.
        source: Box<MultiStageError>,
    },

    /// Several errors at once.
    #[error("{0}")]
    Aggregate(#[from] AggregateError),
}

impl MultiStageError {
    /// Tags this error with the phase that produced it.
    #[must_use]
    pub fn in_phase(self, test: impl Into<String>, phase: Phase) -> Self {
        Self::InPhase {
            test: test.into(),
            phase,
            source: Box::new(self),
        }
    }

    /// Returns the phase this error was tagged with, if any.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::InPhase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Returns the innermost error, looking through phase tags.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::InPhase { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors that abort an invocation before any pod runs. Never retried.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The cluster profile secret is missing or unreadable.
    #[error("could not find secret {name:?}: {source}")]
    MissingProfileSecret {
        /// The expected secret name.
        name: String,
        /// The underlying client error.
        source: ClientError,
    },

    /// A parameter required by the cluster profile did not resolve.
    #[error("could not resolve parameter {name}: {reason}")]
    UnresolvedParameter {
        /// The parameter name.
        name: String,
        /// Why resolution failed.
        reason: String,
    },
}

/// Error raised when translating a resource request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceParseError {
    /// The request names a preset that is not defined.
    #[error("unknown resource preset {0:?}")]
    UnknownPreset(String),

    /// A quantity string could not be parsed.
    #[error("could not parse {field} for {resource}: invalid quantity {value:?}")]
    InvalidQuantity {
        /// Either `limit` or `request`.
        field: &'static str,
        /// The resource kind, e.g. `cpu`.
        resource: String,
        /// The offending value.
        value: String,
    },
}

/// What went wrong while synthesizing a pod.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisErrorKind {
    /// The resource request was invalid.
    #[error(transparent)]
    Resources(#[from] ResourceParseError),

    /// The step's image could not be resolved.
    #[error("could not resolve image: {0}")]
    Image(String),

    /// The test name collides with a volume every pod carries.
    #[error("test name {0:?} is reserved for a pod volume")]
    ReservedName(String),
}

/// Error raised when a step's pod cannot be synthesized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step {step:?} (pod {pod:?}): {kind}")]
pub struct SynthesisError {
    /// The step name.
    pub step: String,
    /// The pod that would have been created.
    pub pod: String,
    /// The failure.
    pub kind: SynthesisErrorKind,
}

impl SynthesisError {
    /// Creates a new synthesis error.
    #[must_use]
    pub fn new(step: impl Into<String>, pod: impl Into<String>, kind: impl Into<SynthesisErrorKind>) -> Self {
        Self {
            step: step.into(),
            pod: pod.into(),
            kind: kind.into(),
        }
    }
}

/// What went wrong while executing a pod.
#[derive(Debug, Error)]
pub enum ExecutionErrorKind {
    /// The pod could not be created or replaced.
    #[error("failed to create or restart pod: {0}")]
    Create(#[source] ClientError),

    /// Observing the pod failed.
    #[error("failed to observe pod: {0}")]
    Wait(#[source] ClientError),

    /// The pod reached the failed phase.
    #[error("{0}")]
    Failed(String),

    /// The pod disappeared while being waited on.
    #[error("pod was deleted while waiting for it to complete")]
    Deleted,

    /// The invocation was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// Error attributed to one step's pod.
#[derive(Debug, Error)]
#[error("{test:?} pod {pod:?} (step {step:?}) failed: {kind}")]
pub struct ExecutionError {
    /// The test name.
    pub test: String,
    /// The step name.
    pub step: String,
    /// The pod name.
    pub pod: String,
    /// The failure.
    pub kind: ExecutionErrorKind,
}

impl ExecutionError {
    /// Returns true if the failure was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ExecutionErrorKind::Cancelled(_))
    }
}

/// Best-effort cleanup failure. Logged, never returned from `run`.
#[derive(Debug, Error)]
#[error("failed to delete pods with label {selector}: {source}")]
pub struct CleanupError {
    /// The label selector used.
    pub selector: String,
    /// The underlying client error.
    pub source: ClientError,
}

/// Errors returned by cluster clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The object does not exist.
    #[error("{kind} {name:?} not found")]
    NotFound {
        /// The object kind.
        kind: &'static str,
        /// The object name.
        name: String,
    },

    /// The object already exists.
    #[error("{kind} {name:?} already exists")]
    AlreadyExists {
        /// The object kind.
        kind: &'static str,
        /// The object name.
        name: String,
    },

    /// Any other API failure.
    #[error("api error: {0}")]
    Api(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Returns true if the object did not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A list of errors treated as one.
///
/// An empty aggregate means success; see [`AggregateError::into_result`].
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<MultiStageError>,
}

impl AggregateError {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error.
    pub fn push(&mut self, error: impl Into<MultiStageError>) {
        self.errors.push(error.into());
    }

    /// Returns the number of errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns true if no errors were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterates over the collected errors.
    pub fn iter(&self) -> std::slice::Iter<'_, MultiStageError> {
        self.errors.iter()
    }

    /// Returns the errors with nested aggregates expanded in place.
    #[must_use]
    pub fn flatten(self) -> Vec<MultiStageError> {
        let mut out = Vec::with_capacity(self.errors.len());
        for error in self.errors {
            match error {
                MultiStageError::Aggregate(nested) => out.extend(nested.flatten()),
                other => out.push(other),
            }
        }
        out
    }

    /// Returns `Ok(())` when empty, otherwise the flattened aggregate.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.flatten().into_iter().collect())
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => Ok(()),
            [only] => write!(f, "{only}"),
            many => {
                f.write_str("[")?;
                for (i, error) in many.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{error}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl std::error::Error for AggregateError {}

impl FromIterator<MultiStageError> for AggregateError {
    fn from_iter<I: IntoIterator<Item = MultiStageError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for AggregateError {
    type Item = MultiStageError;
    type IntoIter = std::vec::IntoIter<MultiStageError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}
