//! Cluster clients backed by the Kubernetes API.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{Api, AttachParams, DeleteParams, ListParams, PostParams};
use kube::Client;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::{PodClient, SecretClient};
use crate::errors::ClientError;

fn map_error(kind: &'static str, name: &str, error: kube::Error) -> ClientError {
    match error {
        kube::Error::Api(response) if response.code == 404 => ClientError::not_found(kind, name),
        kube::Error::Api(response) if response.code == 409 => ClientError::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        other => ClientError::Api(other.to_string()),
    }
}

/// Pod operations in one namespace.
#[derive(Clone)]
pub struct KubePodClient {
    api: Api<Pod>,
    namespace: String,
}

impl KubePodClient {
    /// Creates a client bound to `namespace`.
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl PodClient for KubePodClient {
    async fn create(&self, pod: &Pod) -> Result<Pod, ClientError> {
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        self.api
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| map_error("pod", name, e))
    }

    async fn get(&self, name: &str) -> Result<Pod, ClientError> {
        self.api.get(name).await.map_err(|e| map_error("pod", name, e))
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_error("pod", name, e))
    }

    async fn delete_collection(&self, label_selector: &str) -> Result<(), ClientError> {
        debug!(namespace = %self.namespace, selector = %label_selector, "Deleting pods by label");
        self.api
            .delete_collection(&DeleteParams::default(), &ListParams::default().labels(label_selector))
            .await
            .map(|_| ())
            .map_err(|e| map_error("pod", label_selector, e))
    }

    async fn exec(&self, pod: &str, container: &str, command: &[String]) -> Result<Vec<u8>, ClientError> {
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(false);
        let mut attached = self
            .api
            .exec(pod, command.to_vec(), &params)
            .await
            .map_err(|e| map_error("pod", pod, e))?;

        let status = attached.take_status();
        let mut output = Vec::new();
        if let Some(mut stdout) = attached.stdout() {
            stdout.read_to_end(&mut output).await?;
        }
        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    return Err(ClientError::Api(format!(
                        "command {:?} failed in {pod}/{container}: {}",
                        command.join(" "),
                        status.message.unwrap_or_default()
                    )));
                }
            }
        }
        attached
            .join()
            .await
            .map_err(|e| ClientError::Api(e.to_string()))?;
        Ok(output)
    }
}

impl std::fmt::Debug for KubePodClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubePodClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Secret operations in one namespace.
#[derive(Clone)]
pub struct KubeSecretClient {
    api: Api<Secret>,
    namespace: String,
}

impl KubeSecretClient {
    /// Creates a client bound to `namespace`.
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl SecretClient for KubeSecretClient {
    async fn get(&self, name: &str) -> Result<Secret, ClientError> {
        self.api.get(name).await.map_err(|e| map_error("secret", name, e))
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, ClientError> {
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        self.api
            .create(&PostParams::default(), secret)
            .await
            .map_err(|e| map_error("secret", name, e))
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_error("secret", name, e))
    }
}

impl std::fmt::Debug for KubeSecretClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
