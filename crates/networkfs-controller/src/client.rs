//! Kubernetes API access for the reconcilers
//!
//! Every read and write the reconcilers perform goes through [`KubeClient`],
//! so reconciliation logic can be exercised against mocks or an in-memory
//! fake. Writes are optimistic: they carry the resourceVersion that was read
//! and fail with 409 Conflict if the object moved on.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, PersistentVolume};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use networkfs_common::crd::{NetworkFilesystem, NetworkFilesystemStatus, VolumeAttachment};
use networkfs_common::{Error, FIELD_MANAGER};

/// Trait abstracting the control-plane operations used by the reconcilers
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a NetworkFilesystem by name from the manager namespace
    async fn get_network_filesystem(&self, name: &str)
        -> Result<Option<NetworkFilesystem>, Error>;

    /// Create a NetworkFilesystem together with its initial status
    async fn create_network_filesystem(&self, nfs: &NetworkFilesystem) -> Result<(), Error>;

    /// Write `status` to the status subresource of `nfs`
    ///
    /// The write is conditional on `nfs` still being at the resourceVersion
    /// it was read at. `spec` is never touched.
    async fn update_network_filesystem_status(
        &self,
        nfs: &NetworkFilesystem,
        status: &NetworkFilesystemStatus,
    ) -> Result<(), Error>;

    /// Get the export Endpoints object for a volume
    async fn get_endpoints(&self, name: &str) -> Result<Option<Endpoints>, Error>;

    /// Get the PersistentVolume backing a volume
    async fn get_persistent_volume(&self, name: &str) -> Result<Option<PersistentVolume>, Error>;

    /// Get the Longhorn VolumeAttachment for a volume
    async fn get_volume_attachment(&self, name: &str) -> Result<Option<VolumeAttachment>, Error>;

    /// Replace a VolumeAttachment, conditional on its resourceVersion
    async fn replace_volume_attachment(&self, va: &VolumeAttachment) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
    namespace: String,
    longhorn_namespace: String,
}

impl KubeClientImpl {
    /// Create a client scoped to the manager and storage namespaces
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        longhorn_namespace: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            longhorn_namespace: longhorn_namespace.into(),
        }
    }

    fn network_filesystems(&self, namespace: Option<String>) -> Api<NetworkFilesystem> {
        let ns = namespace.unwrap_or_else(|| self.namespace.clone());
        Api::namespaced(self.client.clone(), &ns)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    async fn patch_status(
        &self,
        api: &Api<NetworkFilesystem>,
        name: &str,
        resource_version: Option<String>,
        status: &NetworkFilesystemStatus,
    ) -> Result<(), Error> {
        // resourceVersion in a merge patch acts as a precondition
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status,
        });
        api.patch_status(name, &Self::patch_params(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_network_filesystem(
        &self,
        name: &str,
    ) -> Result<Option<NetworkFilesystem>, Error> {
        Ok(self.network_filesystems(None).get_opt(name).await?)
    }

    async fn create_network_filesystem(&self, nfs: &NetworkFilesystem) -> Result<(), Error> {
        let api = self.network_filesystems(nfs.namespace());
        let created = api.create(&Self::post_params(), nfs).await?;
        debug!(network_filesystem = %created.name_any(), "NetworkFilesystem created");

        // The status subresource drops status on create, so write it separately
        if let Some(status) = &nfs.status {
            self.patch_status(
                &api,
                &created.name_any(),
                created.resource_version(),
                status,
            )
            .await?;
        }
        Ok(())
    }

    async fn update_network_filesystem_status(
        &self,
        nfs: &NetworkFilesystem,
        status: &NetworkFilesystemStatus,
    ) -> Result<(), Error> {
        let api = self.network_filesystems(nfs.namespace());
        self.patch_status(&api, &nfs.name_any(), nfs.resource_version(), status)
            .await
    }

    async fn get_endpoints(&self, name: &str) -> Result<Option<Endpoints>, Error> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), &self.longhorn_namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_persistent_volume(&self, name: &str) -> Result<Option<PersistentVolume>, Error> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn get_volume_attachment(&self, name: &str) -> Result<Option<VolumeAttachment>, Error> {
        let api: Api<VolumeAttachment> =
            Api::namespaced(self.client.clone(), &self.longhorn_namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn replace_volume_attachment(&self, va: &VolumeAttachment) -> Result<(), Error> {
        let namespace = va
            .namespace()
            .unwrap_or_else(|| self.longhorn_namespace.clone());
        let api: Api<VolumeAttachment> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&va.name_any(), &Self::post_params(), va).await?;
        Ok(())
    }
}
