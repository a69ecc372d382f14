//! Platform client
//!
//! The reconcile logic talks to the API server only through [`PlatformClient`],
//! which keeps generation and aggregation testable without a cluster.

use crate::crd::WebServer;
use crate::error::{OperatorError, Result};
use crate::openshift::{BuildConfig, DeploymentConfig, ImageStream, Route};
use crate::target::TargetResource;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Field manager recorded on objects the operator writes
pub const FIELD_MANAGER: &str = "webserver-operator";

/// Operations the reconciler needs from the cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Names of all API groups the server offers
    async fn api_groups(&self) -> Result<Vec<String>>;

    /// Fetch a `WebServer`; `None` when it no longer exists
    async fn get_web_server(&self, namespace: &str, name: &str) -> Result<Option<WebServer>>;

    /// Whether an object with the target's kind, namespace and name exists
    async fn exists(&self, resource: &TargetResource) -> Result<bool>;

    /// Create the target object
    async fn create(&self, resource: &TargetResource) -> Result<()>;

    /// Pods in `namespace` carrying all of `labels`
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>>;

    /// Replace the status subresource with `web_server.status`
    async fn replace_status(&self, web_server: &WebServer) -> Result<()>;
}

/// [`PlatformClient`] backed by a `kube::Client`
#[derive(Clone)]
pub struct KubePlatformClient {
    client: Client,
}

impl KubePlatformClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn exists_in<K>(&self, namespace: &str, name: &str) -> Result<bool>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_metadata_opt(name).await?.is_some())
    }

    async fn create_in<K>(&self, object: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let namespace = object.namespace().ok_or_else(|| {
            OperatorError::InvalidConfig(format!(
                "{} '{}' is missing metadata.namespace",
                K::kind(&()),
                object.name_any()
            ))
        })?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.create(&pp, object).await?;
        Ok(())
    }
}

/// Render a label map as a `k=v,k=v` selector
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl PlatformClient for KubePlatformClient {
    async fn api_groups(&self) -> Result<Vec<String>> {
        let groups = self.client.list_api_groups().await?;
        Ok(groups.groups.into_iter().map(|g| g.name).collect())
    }

    async fn get_web_server(&self, namespace: &str, name: &str) -> Result<Option<WebServer>> {
        let api: Api<WebServer> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn exists(&self, resource: &TargetResource) -> Result<bool> {
        let (ns, name) = (resource.namespace(), resource.name());
        match resource {
            TargetResource::Service(_) => self.exists_in::<Service>(ns, name).await,
            TargetResource::ConfigMap(_) => self.exists_in::<ConfigMap>(ns, name).await,
            TargetResource::PersistentVolumeClaim(_) => {
                self.exists_in::<PersistentVolumeClaim>(ns, name).await
            }
            TargetResource::Pod(_) => self.exists_in::<Pod>(ns, name).await,
            TargetResource::RoleBinding(_) => self.exists_in::<RoleBinding>(ns, name).await,
            TargetResource::Deployment(_) => self.exists_in::<Deployment>(ns, name).await,
            TargetResource::ImageStream(_) => self.exists_in::<ImageStream>(ns, name).await,
            TargetResource::BuildConfig(_) => self.exists_in::<BuildConfig>(ns, name).await,
            TargetResource::DeploymentConfig(_) => {
                self.exists_in::<DeploymentConfig>(ns, name).await
            }
            TargetResource::Route(_) => self.exists_in::<Route>(ns, name).await,
        }
    }

    async fn create(&self, resource: &TargetResource) -> Result<()> {
        debug!(target_resource = %resource, "Creating object");
        match resource {
            TargetResource::Service(o) => self.create_in(o).await,
            TargetResource::ConfigMap(o) => self.create_in(o).await,
            TargetResource::PersistentVolumeClaim(o) => self.create_in(o).await,
            TargetResource::Pod(o) => self.create_in(o).await,
            TargetResource::RoleBinding(o) => self.create_in(o).await,
            TargetResource::Deployment(o) => self.create_in(o).await,
            TargetResource::ImageStream(o) => self.create_in(o).await,
            TargetResource::BuildConfig(o) => self.create_in(o).await,
            TargetResource::DeploymentConfig(o) => self.create_in(o).await,
            TargetResource::Route(o) => self.create_in(o).await,
        }
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(&label_selector(labels));
        Ok(api.list(&lp).await?.items)
    }

    async fn replace_status(&self, web_server: &WebServer) -> Result<()> {
        let namespace = web_server
            .namespace()
            .unwrap_or_else(|| "default".to_string());
        let api: Api<WebServer> = Api::namespaced(self.client.clone(), &namespace);
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.replace_status(&web_server.name_any(), &pp, serde_json::to_vec(web_server)?)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_selector() {
        let labels = BTreeMap::from([
            ("deploymentConfig".to_string(), "demo".to_string()),
            ("WebServer".to_string(), "example".to_string()),
        ]);
        assert_eq!(
            label_selector(&labels),
            "WebServer=example,deploymentConfig=demo"
        );
        assert_eq!(label_selector(&BTreeMap::new()), "");
    }
}
