//! Cluster client interfaces.
//!
//! Clients are bound to one namespace. Callers treat
//! [`ClientError::NotFound`] on delete as success.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};

use crate::errors::ClientError;

/// Operations over pods in one namespace.
#[async_trait]
pub trait PodClient: Send + Sync {
    /// Creates a pod.
    async fn create(&self, pod: &Pod) -> Result<Pod, ClientError>;

    /// Fetches a pod by name.
    async fn get(&self, name: &str) -> Result<Pod, ClientError>;

    /// Deletes a pod by name.
    async fn delete(&self, name: &str) -> Result<(), ClientError>;

    /// Deletes every pod matching a label selector such as `key=value`.
    async fn delete_collection(&self, label_selector: &str) -> Result<(), ClientError>;

    /// Runs a command in a container and returns its standard output.
    async fn exec(&self, pod: &str, container: &str, command: &[String]) -> Result<Vec<u8>, ClientError>;
}

/// Operations over secrets in one namespace.
#[async_trait]
pub trait SecretClient: Send + Sync {
    /// Fetches a secret by name.
    async fn get(&self, name: &str) -> Result<Secret, ClientError>;

    /// Creates a secret.
    async fn create(&self, secret: &Secret) -> Result<Secret, ClientError>;

    /// Deletes a secret by name.
    async fn delete(&self, name: &str) -> Result<(), ClientError>;
}
