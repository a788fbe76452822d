//! Kubernetes API access for the reconciler
//!
//! [`ClusterClient`] is the seam between the reconciliation algorithm and the
//! API server, so passes can be tested against mocks or an in-memory cluster.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{FalconContainer, FalconContainerStatus};
use crate::error::is_already_exists;
use crate::{Error, FIELD_MANAGER};

/// Result of a create request that did not fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The object was created by this request
    Created,
    /// An object with the same name already existed; nothing was changed
    AlreadyExists,
}

/// Trait abstracting the cluster operations a reconciliation pass needs
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List every namespace in the cluster
    async fn list_namespaces(&self) -> Result<Vec<Namespace>, Error>;

    /// List secrets across all namespaces matching an exact label selector
    async fn list_secrets(&self, label_selector: &str) -> Result<Vec<Secret>, Error>;

    /// Create a secret in its own namespace
    ///
    /// An already-existing object is reported as [`CreateOutcome::AlreadyExists`],
    /// never as an error.
    async fn create_secret(&self, secret: &Secret) -> Result<CreateOutcome, Error>;

    /// Patch the status of a FalconContainer
    async fn patch_status(&self, name: &str, status: &FalconContainerStatus)
        -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Create a new KubeClusterClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = api.list(&ListParams::default()).await?;
        Ok(namespaces.items)
    }

    async fn list_secrets(&self, label_selector: &str) -> Result<Vec<Secret>, Error> {
        let api: Api<Secret> = Api::all(self.client.clone());
        let secrets = api
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(secrets.items)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<CreateOutcome, Error> {
        let namespace = secret
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::internal("secret has no namespace"))?;

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        match api.create(&params, secret).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(e) if is_already_exists(&e) => {
                debug!(namespace = %namespace, "secret already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_status(
        &self,
        name: &str,
        status: &FalconContainerStatus,
    ) -> Result<(), Error> {
        let api: Api<FalconContainer> = Api::all(self.client.clone());

        // Merge patches need explicit nulls and empty lists to clear fields that
        // serde would otherwise skip.
        let status_patch = serde_json::json!({
            "status": {
                "phase": status.phase,
                "message": status.message,
                "failedNamespaces": status.failed_namespaces,
                "lastSynced": status.last_synced,
            }
        });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}
