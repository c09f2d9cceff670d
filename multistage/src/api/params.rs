//! Parameters resolved lazily from other steps.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::StepLink;

/// A lazily evaluated parameter value.
pub type ParameterFn = Arc<dyn Fn() -> Result<String, String> + Send + Sync>;

/// Parameters a step provides to others, by name.
pub type ParameterMap = BTreeMap<String, ParameterFn>;

/// Error raised when a parameter cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    /// Nothing provides the parameter.
    #[error("parameter {0} is not defined")]
    Unknown(String),

    /// The provider failed.
    #[error("parameter {name} could not be resolved: {reason}")]
    Failed {
        /// The parameter name.
        name: String,
        /// The provider's error.
        reason: String,
    },
}

/// A source of named parameter values.
#[cfg_attr(test, mockall::automock)]
pub trait Parameters: Send + Sync {
    /// Resolves a parameter.
    fn get(&self, name: &str) -> Result<String, ParameterError>;

    /// Returns the links that must be satisfied before `get(name)` can succeed.
    fn links(&self, name: &str) -> Vec<StepLink>;
}

/// Parameters whose values are computed on first use and then cached.
///
/// Values set with [`DeferredParameters::set`] are fixed up front and need no
/// links.
#[derive(Default)]
pub struct DeferredParameters {
    fns: RwLock<BTreeMap<String, ParameterFn>>,
    links: RwLock<BTreeMap<String, Vec<StepLink>>>,
    values: RwLock<BTreeMap<String, String>>,
    /// Results of lazily computed parameters. Unlike `values`, these keep their links.
    resolved: RwLock<BTreeMap<String, String>>,
}

impl DeferredParameters {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a lazily computed parameter, optionally gated by a link.
    pub fn add<F>(&self, name: impl Into<String>, link: Option<StepLink>, f: F)
    where
        F: Fn() -> Result<String, String> + Send + Sync + 'static,
    {
        let name = name.into();
        if let Some(link) = link {
            self.links.write().entry(name.clone()).or_default().push(link);
        }
        self.fns.write().insert(name, Arc::new(f));
    }

    /// Registers every parameter of a provider's map behind the same link.
    pub fn add_map(&self, map: &ParameterMap, link: Option<&StepLink>) {
        for (name, f) in map {
            if let Some(link) = link {
                self.links.write().entry(name.clone()).or_default().push(link.clone());
            }
            self.fns.write().insert(name.clone(), f.clone());
        }
    }

    /// Fixes a parameter's value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(name.into(), value.into());
    }

    /// Returns true if the parameter is known.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.values.read().contains_key(name) || self.fns.read().contains_key(name)
    }
}

impl Parameters for DeferredParameters {
    fn get(&self, name: &str) -> Result<String, ParameterError> {
        if let Some(value) = self.values.read().get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.resolved.read().get(name) {
            return Ok(value.clone());
        }
        let f = self
            .fns
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))?;
        let value = f().map_err(|reason| ParameterError::Failed {
            name: name.to_string(),
            reason,
        })?;
        self.resolved.write().insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn links(&self, name: &str) -> Vec<StepLink> {
        if self.values.read().contains_key(name) {
            return Vec::new();
        }
        self.links.read().get(name).cloned().unwrap_or_default()
    }
}

impl std::fmt::Debug for DeferredParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredParameters")
            .field("values", &self.values.read().keys().collect::<Vec<_>>())
            .field("deferred", &self.fns.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
