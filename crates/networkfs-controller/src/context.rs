//! Shared state handed to every reconcile call

use std::sync::Arc;

use kube::Client;

use networkfs_common::{DEFAULT_NAMESPACE, LONGHORN_NAMESPACE};

use crate::client::{KubeClient, KubeClientImpl};

/// Controller context shared by the three reconcilers
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Namespace holding NetworkFilesystem resources
    pub namespace: String,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context with default namespaces
    ///
    /// Equivalent to `Context::builder(client).build()`.
    pub fn new(client: Client) -> Self {
        Self::builder(client).build()
    }

    /// Create a context for testing with a mock or fake client
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn KubeClient>) -> Self {
        Self {
            kube,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    namespace: String,
    longhorn_namespace: String,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            longhorn_namespace: LONGHORN_NAMESPACE.to_string(),
        }
    }

    /// Namespace holding NetworkFilesystem resources
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Namespace of the storage subsystem (Endpoints, VolumeAttachments)
    pub fn longhorn_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.longhorn_namespace = namespace.into();
        self
    }

    /// Override the Kubernetes client (primarily for testing)
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Build the context
    pub fn build(self) -> Context {
        let kube = self.kube.unwrap_or_else(|| {
            Arc::new(KubeClientImpl::new(
                self.client,
                self.namespace.clone(),
                self.longhorn_namespace,
            ))
        });
        Context {
            kube,
            namespace: self.namespace,
        }
    }
}
