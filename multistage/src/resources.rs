//! Translation of abstract resource requests into container resources.

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::errors::ResourceParseError;

/// A step's resource needs: an optional preset plus explicit overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Name of a preset providing the baseline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Requests by resource kind, e.g. `cpu: 100m`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    /// Limits by resource kind, e.g. `memory: 2Gi`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

impl ResourceRequest {
    /// Creates a request based on a preset.
    #[must_use]
    pub fn preset(name: impl Into<String>) -> Self {
        Self {
            preset: Some(name.into()),
            ..Self::default()
        }
    }

    /// Adds a request.
    #[must_use]
    pub fn with_request(mut self, resource: impl Into<String>, value: impl Into<String>) -> Self {
        self.requests.insert(resource.into(), value.into());
        self
    }

    /// Adds a limit.
    #[must_use]
    pub fn with_limit(mut self, resource: impl Into<String>, value: impl Into<String>) -> Self {
        self.limits.insert(resource.into(), value.into());
        self
    }
}

/// Named baseline resource requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePresets {
    presets: BTreeMap<String, ResourceRequest>,
}

impl Default for ResourcePresets {
    fn default() -> Self {
        let mut presets = BTreeMap::new();
        presets.insert(
            "small".to_string(),
            ResourceRequest::default()
                .with_request("cpu", "100m")
                .with_request("memory", "200Mi"),
        );
        presets.insert(
            "medium".to_string(),
            ResourceRequest::default()
                .with_request("cpu", "1")
                .with_request("memory", "2Gi")
                .with_limit("memory", "4Gi"),
        );
        presets.insert(
            "large".to_string(),
            ResourceRequest::default()
                .with_request("cpu", "3")
                .with_request("memory", "8Gi")
                .with_limit("memory", "16Gi"),
        );
        Self { presets }
    }
}

impl ResourcePresets {
    /// Creates a registry with no presets.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            presets: BTreeMap::new(),
        }
    }

    /// Adds or replaces a preset.
    #[must_use]
    pub fn with_preset(mut self, name: impl Into<String>, request: ResourceRequest) -> Self {
        self.presets.insert(name.into(), request);
        self
    }

    /// Returns a preset by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceRequest> {
        self.presets.get(name)
    }

    /// Translates a request into validated container resources.
    ///
    /// Explicit entries override the preset per resource kind. Presets do not
    /// nest.
    pub fn resources_for(&self, request: &ResourceRequest) -> Result<ResourceRequirements, ResourceParseError> {
        let (mut requests, mut limits) = match &request.preset {
            Some(name) => {
                let preset = self
                    .get(name)
                    .ok_or_else(|| ResourceParseError::UnknownPreset(name.clone()))?;
                (preset.requests.clone(), preset.limits.clone())
            }
            None => (BTreeMap::new(), BTreeMap::new()),
        };
        requests.extend(request.requests.iter().map(|(k, v)| (k.clone(), v.clone())));
        limits.extend(request.limits.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(ResourceRequirements {
            limits: parse_all("limit", limits)?,
            requests: parse_all("request", requests)?,
            ..ResourceRequirements::default()
        })
    }
}

fn parse_all(
    field: &'static str,
    values: BTreeMap<String, String>,
) -> Result<Option<BTreeMap<String, Quantity>>, ResourceParseError> {
    if values.is_empty() {
        return Ok(None);
    }
    values
        .into_iter()
        .map(|(resource, value)| {
            let quantity = parse_quantity(&value).ok_or_else(|| ResourceParseError::InvalidQuantity {
                field,
                resource: resource.clone(),
                value,
            })?;
            Ok((resource, quantity))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map(Some)
}

fn quantity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[KMGTPE]i|[numkMGTPE]|[eE][+-]?[0-9]+)?$")
            .unwrap_or_else(|e| unreachable!("quantity pattern is valid: {e}"))
    })
}

/// Validates a Kubernetes quantity string such as `100m`, `2Gi` or `1e3`.
#[must_use]
pub fn parse_quantity(value: &str) -> Option<Quantity> {
    let value = value.trim();
    quantity_regex()
        .is_match(value)
        .then(|| Quantity(value.to_string()))
}
