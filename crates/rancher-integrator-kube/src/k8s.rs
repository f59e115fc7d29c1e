//! Kubernetes applier implementation.
//!
//! This module provides the `KubeApplier` which installs and removes the
//! objects of a manifest through server-side apply.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::discovery::{self, Scope};
use kube::Client;
use tracing::{debug, info, warn};

use crate::error::{ApplyError, Result};
use crate::manifest::{parse_manifest, ManifestObject};
use crate::types::ApplierConfig;

/// Trait for installing and removing manifests in the cluster.
///
/// This trait abstracts the Kubernetes client so the registration flow can be
/// exercised without a cluster.
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    /// Apply every object of a manifest, in document order.
    ///
    /// Applying the same manifest twice is a no-op on the second call.
    ///
    /// # Errors
    ///
    /// Returns an error on the first object that cannot be applied.
    async fn apply(&self, manifest: &str) -> Result<()>;

    /// Delete every object of a manifest, in reverse document order.
    ///
    /// Objects that are already gone are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first deletion error after attempting every object.
    async fn delete(&self, manifest: &str) -> Result<()>;
}

/// Kubernetes-based manifest applier.
pub struct KubeApplier {
    client: Client,
    config: ApplierConfig,
}

impl KubeApplier {
    /// Create a new applier.
    ///
    /// This will attempt to connect to the cluster using in-cluster config
    /// or kubeconfig file.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes client cannot be created.
    pub async fn new(config: ApplierConfig) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ApplyError::from_kube("client", e))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a new applier with a pre-configured client.
    #[must_use]
    pub fn with_client(client: Client, config: ApplierConfig) -> Self {
        Self { client, config }
    }

    /// Build an API handle for an object, resolving its scope through discovery.
    async fn api_for(&self, object: &ManifestObject) -> Result<Api<DynamicObject>> {
        let (resource, capabilities) = discovery::pinned_kind(&self.client, &object.gvk)
            .await
            .map_err(|e| ApplyError::from_kube(object.describe(), e))?;

        Ok(match capabilities.scope {
            Scope::Namespaced => {
                let namespace = object
                    .namespace()
                    .unwrap_or(&self.config.default_namespace);
                Api::namespaced_with(self.client.clone(), namespace, &resource)
            }
            Scope::Cluster => Api::all_with(self.client.clone(), &resource),
        })
    }

    async fn apply_object(&self, object: &ManifestObject) -> Result<()> {
        let api = self.api_for(object).await?;
        let params = PatchParams::apply(&self.config.field_manager).force();

        api.patch(&object.name, &params, &Patch::Apply(&object.object))
            .await
            .map_err(|e| ApplyError::from_kube(object.describe(), e))?;

        debug!(resource = %object.describe(), "Applied object");
        Ok(())
    }

    async fn delete_object(&self, object: &ManifestObject) -> Result<()> {
        let api = self.api_for(object).await?;

        match api.delete(&object.name, &DeleteParams::background()).await {
            Ok(_) => {
                debug!(resource = %object.describe(), "Deleted object");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(resource = %object.describe(), "Object not found, already deleted");
                Ok(())
            }
            Err(e) => Err(ApplyError::from_kube(object.describe(), e)),
        }
    }
}

#[async_trait]
impl ManifestApplier for KubeApplier {
    async fn apply(&self, manifest: &str) -> Result<()> {
        let objects = parse_manifest(manifest)?;

        for object in &objects {
            self.apply_object(object).await?;
        }

        info!(objects = objects.len(), "Applied manifest");
        Ok(())
    }

    async fn delete(&self, manifest: &str) -> Result<()> {
        let objects = parse_manifest(manifest)?;
        let mut first_error = None;

        for object in objects.iter().rev() {
            if let Err(e) = self.delete_object(object).await {
                warn!(resource = %object.describe(), error = %e, "Failed to delete object");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(objects = objects.len(), "Deleted manifest");
                Ok(())
            }
        }
    }
}

/// A mock applier for testing without a real Kubernetes cluster.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// A failure the mock applier can be told to produce.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MockFailure {
        /// Fail as if the API server answered 403.
        Forbidden,
        /// Fail as if the API server rejected the request with this message.
        Rejected(String),
    }

    impl MockFailure {
        fn to_error(&self) -> ApplyError {
            match self {
                Self::Forbidden => ApplyError::Forbidden {
                    resource: "ClusterRole/mock".to_string(),
                    message: "forbidden".to_string(),
                },
                Self::Rejected(message) => ApplyError::Rejected {
                    resource: "Deployment/mock".to_string(),
                    code: 422,
                    message: message.clone(),
                },
            }
        }
    }

    /// A mock applier that records manifests in memory.
    #[derive(Default)]
    pub struct MockApplier {
        applied: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
        apply_failure: Mutex<Option<MockFailure>>,
        delete_failure: Mutex<Option<MockFailure>>,
    }

    impl MockApplier {
        /// Create a new mock applier.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent apply fail (or succeed again with `None`).
        pub fn fail_apply(&self, failure: Option<MockFailure>) {
            *self.apply_failure.lock() = failure;
        }

        /// Make every subsequent delete fail (or succeed again with `None`).
        pub fn fail_delete(&self, failure: Option<MockFailure>) {
            *self.delete_failure.lock() = failure;
        }

        /// Number of apply calls, including failed ones.
        #[must_use]
        pub fn apply_calls(&self) -> usize {
            self.applied.lock().len()
        }

        /// Number of delete calls, including failed ones.
        #[must_use]
        pub fn delete_calls(&self) -> usize {
            self.deleted.lock().len()
        }

        /// The manifest passed to the most recent apply.
        #[must_use]
        pub fn last_applied(&self) -> Option<String> {
            self.applied.lock().last().cloned()
        }

        /// The manifest passed to the most recent delete.
        #[must_use]
        pub fn last_deleted(&self) -> Option<String> {
            self.deleted.lock().last().cloned()
        }
    }

    #[async_trait]
    impl ManifestApplier for MockApplier {
        async fn apply(&self, manifest: &str) -> Result<()> {
            self.applied.lock().push(manifest.to_string());
            match self.apply_failure.lock().as_ref() {
                Some(failure) => Err(failure.to_error()),
                None => Ok(()),
            }
        }

        async fn delete(&self, manifest: &str) -> Result<()> {
            self.deleted.lock().push(manifest.to_string());
            match self.delete_failure.lock().as_ref() {
                Some(failure) => Err(failure.to_error()),
                None => Ok(()),
            }
        }
    }
}
