//! Kubernetes access for topology deployments
//!
//! [`ClusterClient`] is the narrow surface the engine needs from the API
//! server: create the five object kinds of a [`crate::plan::ResourcePlan`],
//! delete them by name, list pods and read their logs. Conflicts and missing
//! objects come back as [`Error::AlreadyExists`] and [`Error::NotFound`] so
//! callers can decide what is idempotent without inspecting HTTP codes.

mod applier;
mod status;

pub use applier::{ApplyReport, Applier};
pub use status::{pod_status, pod_statuses};

use std::fmt::Debug;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams, PropagationPolicy};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Object kinds created for a topology
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// core/v1 ConfigMap
    ConfigMap,
    /// core/v1 Secret
    Secret,
    /// core/v1 Service
    Service,
    /// apps/v1 StatefulSet
    StatefulSet,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::ConfigMap => "ConfigMap",
            Self::Secret => "Secret",
            Self::Service => "Service",
            Self::StatefulSet => "StatefulSet",
        };
        f.write_str(kind)
    }
}

/// Trait abstracting the Kubernetes calls made by the engine
///
/// Allows mocking the API server in tests while using the real client in
/// production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create a ConfigMap
    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()>;

    /// Create a Secret
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<()>;

    /// Create a Service
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()>;

    /// Create a StatefulSet
    async fn create_stateful_set(&self, namespace: &str, stateful_set: &StatefulSet)
        -> Result<()>;

    /// Delete an object by kind and name.
    ///
    /// StatefulSets are deleted with foreground propagation so their pods go
    /// first.
    async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<()>;

    /// List pods matching a label selector
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;

    /// Read the logs of one pod container
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<String>,
        tail_lines: Option<i64>,
    ) -> Result<String>;
}

/// Real Kubernetes client implementation
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap a kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn create<K>(&self, namespace: &str, kind: ResourceKind, obj: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + DeserializeOwned
            + Serialize
            + Send
            + Sync,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let name = obj.name_any();

        match api.create(&PostParams::default(), obj).await {
            Ok(_) => {
                debug!(%kind, %name, namespace, "created");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                Err(Error::already_exists(kind.to_string(), name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_named<K>(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
        params: &DeleteParams,
    ) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);

        match api.delete(name, params).await {
            Ok(_) => {
                debug!(%kind, name, namespace, "deleted");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(Error::not_found(kind.to_string(), name))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        self.create(namespace, ResourceKind::ConfigMap, config_map)
            .await
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<()> {
        self.create(namespace, ResourceKind::Secret, secret).await
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()> {
        self.create(namespace, ResourceKind::Service, service).await
    }

    async fn create_stateful_set(
        &self,
        namespace: &str,
        stateful_set: &StatefulSet,
    ) -> Result<()> {
        self.create(namespace, ResourceKind::StatefulSet, stateful_set)
            .await
    }

    async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<()> {
        let params = DeleteParams::default();
        match kind {
            ResourceKind::ConfigMap => {
                self.delete_named::<ConfigMap>(namespace, kind, name, &params)
                    .await
            }
            ResourceKind::Secret => {
                self.delete_named::<Secret>(namespace, kind, name, &params)
                    .await
            }
            ResourceKind::Service => {
                self.delete_named::<Service>(namespace, kind, name, &params)
                    .await
            }
            ResourceKind::StatefulSet => {
                let params = DeleteParams {
                    propagation_policy: Some(PropagationPolicy::Foreground),
                    ..Default::default()
                };
                self.delete_named::<StatefulSet>(namespace, kind, name, &params)
                    .await
            }
        }
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(selector)).await?;
        Ok(pods.items)
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<String>,
        tail_lines: Option<i64>,
    ) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container,
            tail_lines,
            ..Default::default()
        };

        match api.logs(pod, &params).await {
            Ok(logs) => Ok(logs),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::not_found("Pod", pod)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Create a kube client from an optional kubeconfig path.
///
/// Without a path the configuration is inferred: in-cluster service account
/// first, then `$KUBECONFIG` or `~/.kube/config`.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::config(format!(
                    "failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::config(format!("failed to infer kube config: {}", e)))?,
    };

    Client::try_from(config).map_err(Error::from)
}

/// Run a cluster call with a deadline
pub(crate) async fn bounded<T, F>(timeout: Duration, operation: String, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, timeout }),
    }
}
