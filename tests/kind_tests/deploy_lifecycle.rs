//! Stories about deploying topologies onto a live cluster

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::api::Api;

use ipfs_topology::store::{MemoryStore, TopologyStore};
use ipfs_topology::topology::{DeployPhase, TopologyDraft, TopologyEdge, TopologyNode};

use super::helpers::{controller, create_namespace, delete_namespace, test_client, wait_for};

fn chain_draft() -> TopologyDraft {
    TopologyDraft {
        id: None,
        name: "chain".to_string(),
        nodes: vec![
            TopologyNode::worker("a"),
            TopologyNode::worker("b"),
            TopologyNode::worker("c"),
        ],
        edges: vec![TopologyEdge::new("a", "b"), TopologyEdge::new("b", "c")],
    }
}

/// Story: a three-node chain is deployed, its pods appear, and undeploy
/// removes every object again
#[tokio::test]
#[ignore]
async fn story_chain_topology_round_trip() {
    let client = test_client().await;
    let namespace = create_namespace(&client, "ipfs-topology-e2e").await;

    let store = Arc::new(MemoryStore::new());
    let topology = store.create_topology(chain_draft()).unwrap();
    let id = topology.id().to_string();
    let controller = controller(client.clone(), store.clone(), &namespace);

    controller.deploy(&id, None).await.unwrap();
    let record = store.get_topology(&id).await.unwrap().unwrap();
    assert_eq!(record.deploy_status, DeployPhase::Running);

    let names = ipfs_topology::plan::ResourceNames::for_topology(&id);
    let sts: Api<StatefulSet> = Api::namespaced(client.clone(), &namespace);
    let created = sts.get(names.service()).await.unwrap();
    assert_eq!(created.spec.unwrap().replicas, Some(3));

    let (ctl, topology_id) = (&controller, id.as_str());
    let pods_listed = wait_for(Duration::from_secs(120), || async move {
        ctl.status(topology_id)
            .await
            .map(|s| !s.pods.is_empty())
            .unwrap_or(false)
    })
    .await;
    assert!(pods_listed, "pods should be scheduled");

    let status = controller.status(&id).await.unwrap();
    // "c" is the end of the chain and takes ordinal 0
    assert_eq!(status.pods[0].node_id, "c");

    // Logs are readable once the container has started
    let bootstrap_pod = status.pods[0].pod_name.clone();
    let pod = bootstrap_pod.as_str();
    let logs_readable = wait_for(Duration::from_secs(120), || async move {
        ctl.pod_logs(topology_id, pod, Some("ipfs".to_string()), Some(20))
            .await
            .is_ok()
    })
    .await;
    assert!(logs_readable, "logs of {} should be readable", pod);

    let err = controller
        .pod_logs(&id, "coredns-0", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ipfs_topology::Error::Validation(_)));

    controller.undeploy(&id).await.unwrap();

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    let services: Api<Service> = Api::namespaced(client.clone(), &namespace);
    assert!(config_maps.get_opt(&names.scripts()).await.unwrap().is_none());
    assert!(config_maps.get_opt(&names.env()).await.unwrap().is_none());
    assert!(secrets.get_opt(&names.secrets()).await.unwrap().is_none());
    assert!(services.get_opt(&names.external()).await.unwrap().is_none());

    delete_namespace(&client, &namespace).await;
}

/// Story: deploying twice without undeploying is refused and leaves the
/// running deployment alone
#[tokio::test]
#[ignore]
async fn story_second_deploy_is_rejected() {
    let client = test_client().await;
    let namespace = create_namespace(&client, "ipfs-topology-e2e").await;

    let store = Arc::new(MemoryStore::new());
    let id = store.create_topology(chain_draft()).unwrap().id().to_string();
    let controller = controller(client.clone(), store.clone(), &namespace);

    controller.deploy(&id, None).await.unwrap();
    let err = controller.deploy(&id, None).await.unwrap_err();
    assert!(matches!(err, ipfs_topology::Error::Conflict(_)));

    controller.undeploy(&id).await.unwrap();
    delete_namespace(&client, &namespace).await;
}
