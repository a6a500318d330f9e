//! Shared fixtures for live-cluster tests

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use ipfs_topology::cluster::{create_client, KubeClusterClient};
use ipfs_topology::controller::TopologyController;
use ipfs_topology::store::MemoryStore;

/// Client for the cluster selected by `$KUBECONFIG` or the in-cluster config
pub async fn test_client() -> Client {
    // Ignore the error if another test already installed the provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let path = std::env::var_os("KUBECONFIG").map(std::path::PathBuf::from);
    create_client(path.as_deref())
        .await
        .expect("a Kubernetes cluster should be reachable")
}

/// Create a uniquely named namespace for one test
pub async fn create_namespace(client: &Client, prefix: &str) -> String {
    let name = format!("{}-{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8]);
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            ..Default::default()
        },
        ..Default::default()
    };
    api.create(&PostParams::default(), &ns)
        .await
        .expect("namespace should be created");
    name
}

/// Delete a test namespace; errors are ignored
pub async fn delete_namespace(client: &Client, name: &str) {
    let api: Api<Namespace> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Controller over a fresh in-memory store and the live cluster
pub fn controller(
    client: Client,
    store: Arc<MemoryStore>,
    namespace: &str,
) -> TopologyController {
    TopologyController::builder(store, Arc::new(KubeClusterClient::new(client)), namespace)
        .api_timeout(Duration::from_secs(30))
        .build()
}

/// Poll `check` until it returns true or `timeout` elapses
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    false
}
