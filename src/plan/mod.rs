//! Resource plan synthesis
//!
//! Turns a validated topology plus a freshly minted [`BootstrapIdentity`] into
//! the Kubernetes objects that realize it:
//!
//! - `<svc>-scripts` ConfigMap: entrypoint and init scripts
//! - `<svc>-env` ConfigMap: bootstrap peer id
//! - `<svc>-secrets` Secret: cluster secret and bootstrap private key
//! - `<svc>` headless Service for peer discovery
//! - `<svc>-external` LoadBalancer Service
//! - `<svc>` StatefulSet, one replica per topology node, with two
//!   volumeClaimTemplates (IPFS repo and ipfs-cluster state)
//!
//! Building a plan performs no I/O. Only the identity-derived fields differ
//! between two plans of the same topology.

pub mod scripts;

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapKeySelector, ConfigMapVolumeSource, Container, ContainerPort, EnvVar,
    EnvVarSource, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec,
    Secret, SecretKeySelector, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use serde::Serialize;

use crate::identity::BootstrapIdentity;
use crate::topology::Topology;
use crate::{
    Error, Result, ANNOTATION_BOOTSTRAP_NODE, ANNOTATION_TOPOLOGY_ID, LABEL_APP,
    LABEL_MANAGED_BY, LABEL_MANAGED_BY_VALUE,
};

/// Prefix of every derived service name
pub const SERVICE_PREFIX: &str = "ipfs-";

/// Number of id characters kept in the service name
pub const SERVICE_SUFFIX_LEN: usize = 12;

/// kubo API port
pub const IPFS_API_PORT: i32 = 5001;
/// kubo HTTP gateway port
pub const IPFS_GATEWAY_PORT: i32 = 8080;
/// ipfs-cluster swarm port, used by joining peers
pub const CLUSTER_SWARM_PORT: i32 = 9096;

/// kubo repository mount path
pub const IPFS_DATA_DIR: &str = "/data/ipfs";
/// ipfs-cluster state mount path
pub const CLUSTER_DATA_DIR: &str = "/data/ipfs-cluster";
/// Scripts ConfigMap mount path
pub const SCRIPTS_DIR: &str = "/custom";

/// Env ConfigMap key holding the bootstrap peer id
pub const KEY_BOOTSTRAP_PEER_ID: &str = "bootstrap-peer-id";
/// Secret key holding the cluster secret
pub const KEY_CLUSTER_SECRET: &str = "cluster-secret";
/// Secret key holding the bootstrap private key
pub const KEY_BOOTSTRAP_PRIV_KEY: &str = "bootstrap-peer-priv-key";

/// volumeClaimTemplate for the kubo repository
pub const IPFS_STORAGE_VOLUME: &str = "ipfs-storage";
/// volumeClaimTemplate for ipfs-cluster state
pub const CLUSTER_STORAGE_VOLUME: &str = "cluster-storage";
const SCRIPTS_VOLUME: &str = "configure-script";

/// Container name of the kubo daemon
pub const IPFS_CONTAINER: &str = "ipfs";
/// Container name of the ipfs-cluster daemon
pub const CLUSTER_CONTAINER: &str = "ipfs-cluster";

struct NamedPort {
    name: &'static str,
    port: i32,
    udp: bool,
}

impl NamedPort {
    const fn tcp(name: &'static str, port: i32) -> Self {
        Self {
            name,
            port,
            udp: false,
        }
    }

    const fn udp(name: &'static str, port: i32) -> Self {
        Self {
            name,
            port,
            udp: true,
        }
    }

    fn protocol(&self) -> &'static str {
        if self.udp {
            "UDP"
        } else {
            "TCP"
        }
    }
}

/// Ports exposed by both services
const SERVICE_PORTS: [NamedPort; 8] = [
    NamedPort::tcp("swarm", 4001),
    NamedPort::udp("swarm-udp", 4002),
    NamedPort::tcp("api", IPFS_API_PORT),
    NamedPort::tcp("http", IPFS_GATEWAY_PORT),
    NamedPort::tcp("ws", 8081),
    NamedPort::tcp("cluster-api", 9094),
    NamedPort::tcp("cluster-proxy", 9095),
    NamedPort::tcp("cluster-swarm", CLUSTER_SWARM_PORT),
];

const IPFS_CONTAINER_PORTS: [NamedPort; 5] = [
    NamedPort::tcp("swarm", 4001),
    NamedPort::udp("swarm-udp", 4002),
    NamedPort::tcp("api", IPFS_API_PORT),
    NamedPort::tcp("ws", 8081),
    NamedPort::tcp("http", IPFS_GATEWAY_PORT),
];

const CLUSTER_CONTAINER_PORTS: [NamedPort; 3] = [
    NamedPort::tcp("api-http", 9094),
    NamedPort::tcp("proxy-http", 9095),
    NamedPort::tcp("cluster-swarm", CLUSTER_SWARM_PORT),
];

/// Images and storage used for every peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanSettings {
    /// kubo image
    pub ipfs_image: String,
    /// ipfs-cluster image
    pub cluster_image: String,
    /// StorageClass of both volumeClaimTemplates
    pub storage_class: String,
    /// Requested size of each volume
    pub storage_size: String,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            ipfs_image: "ipfs/kubo:release".to_string(),
            cluster_image: "ipfs/ipfs-cluster:latest".to_string(),
            storage_class: "standard".to_string(),
            storage_size: "30Gi".to_string(),
        }
    }
}

/// Derive the service name of a topology.
///
/// Keeps the first [`SERVICE_SUFFIX_LEN`] lowercase alphanumerics of the id.
/// Ids with fewer usable characters fall back to a prefix of their SHA-256,
/// so the result is always a valid DNS-1123 label and stable per id.
pub fn service_name(topology_id: &str) -> String {
    let cleaned: String = topology_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(SERVICE_SUFFIX_LEN)
        .collect();

    let suffix = if cleaned.len() == SERVICE_SUFFIX_LEN {
        cleaned
    } else {
        let digest = aws_lc_rs::digest::digest(&aws_lc_rs::digest::SHA256, topology_id.as_bytes());
        let mut hashed = hex::encode(digest.as_ref());
        hashed.truncate(SERVICE_SUFFIX_LEN);
        hashed
    };

    format!("{}{}", SERVICE_PREFIX, suffix)
}

/// Names of every object a topology deploys, derived from its id alone
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceNames {
    service: String,
}

impl ResourceNames {
    /// Names for a topology id
    pub fn for_topology(topology_id: &str) -> Self {
        Self {
            service: service_name(topology_id),
        }
    }

    /// Base service name, also the StatefulSet and headless Service name
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Scripts ConfigMap
    pub fn scripts(&self) -> String {
        format!("{}-scripts", self.service)
    }

    /// Env ConfigMap
    pub fn env(&self) -> String {
        format!("{}-env", self.service)
    }

    /// Secret
    pub fn secrets(&self) -> String {
        format!("{}-secrets", self.service)
    }

    /// LoadBalancer Service
    pub fn external(&self) -> String {
        format!("{}-external", self.service)
    }

    /// Label selector matching every pod of the topology
    pub fn selector(&self) -> String {
        format!("{}={}", LABEL_APP, self.service)
    }

    /// StatefulSet ordinal of a pod name, if the pod belongs to this topology
    pub fn pod_ordinal(&self, pod_name: &str) -> Option<usize> {
        let ordinal = pod_name
            .strip_prefix(self.service.as_str())?
            .strip_prefix('-')?;
        // StatefulSet ordinals are plain decimals: no sign, no padding
        let canonical = !ordinal.is_empty()
            && ordinal.bytes().all(|b| b.is_ascii_digit())
            && (ordinal == "0" || !ordinal.starts_with('0'));
        if !canonical {
            return None;
        }
        ordinal.parse().ok()
    }
}

/// Deploy-ready set of objects for one topology
#[derive(Clone, Debug)]
pub struct ResourcePlan {
    /// Derived names
    pub names: ResourceNames,
    /// Target namespace
    pub namespace: String,
    /// StatefulSet replica count
    pub replicas: i32,
    /// Scripts ConfigMap
    pub scripts: ConfigMap,
    /// Env ConfigMap
    pub env: ConfigMap,
    /// Secret with cluster secret and private key
    pub secret: Secret,
    /// Headless discovery Service
    pub headless_service: Service,
    /// LoadBalancer Service
    pub external_service: Service,
    /// Replicated workload
    pub stateful_set: StatefulSet,
}

impl ResourcePlan {
    /// Render every object as a multi-document YAML stream, in apply order
    pub fn to_yaml(&self) -> Result<String> {
        fn doc<T: Serialize>(obj: &T) -> Result<String> {
            serde_yaml::to_string(obj).map_err(|e| Error::serialization(e.to_string()))
        }

        let docs = [
            doc(&self.scripts)?,
            doc(&self.env)?,
            doc(&self.secret)?,
            doc(&self.headless_service)?,
            doc(&self.external_service)?,
            doc(&self.stateful_set)?,
        ];
        Ok(docs.join("---\n"))
    }
}

fn app_labels(names: &ResourceNames) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), names.service.clone()),
        (
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_VALUE.to_string(),
        ),
    ])
}

fn selector(names: &ResourceNames) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_APP.to_string(), names.service.clone())])
}

fn metadata(name: String, namespace: &str, names: &ResourceNames) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        labels: Some(app_labels(names)),
        ..Default::default()
    }
}

/// Build the plan for a topology.
///
/// `bootstrap_node_id` must come from [`crate::topology::resolve_bootstrap`].
pub fn build_plan(
    topology: &Topology,
    bootstrap_node_id: &str,
    identity: &BootstrapIdentity,
    namespace: &str,
    settings: &PlanSettings,
) -> ResourcePlan {
    let names = ResourceNames::for_topology(topology.id());
    let peer_id = identity.peer_id().as_str();
    let replicas = i32::try_from(topology.nodes.len())
        .unwrap_or(i32::MAX)
        .max(1);

    let scripts = ConfigMap {
        metadata: metadata(names.scripts(), namespace, &names),
        data: Some(BTreeMap::from([
            (
                scripts::ENTRYPOINT_KEY.to_string(),
                scripts::entrypoint_script(&names.service, peer_id),
            ),
            (
                scripts::CONFIGURE_IPFS_KEY.to_string(),
                scripts::configure_ipfs_script(),
            ),
        ])),
        ..Default::default()
    };

    let env = ConfigMap {
        metadata: metadata(names.env(), namespace, &names),
        data: Some(BTreeMap::from([(
            KEY_BOOTSTRAP_PEER_ID.to_string(),
            peer_id.to_string(),
        )])),
        ..Default::default()
    };

    let secret = Secret {
        metadata: metadata(names.secrets(), namespace, &names),
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([
            (
                KEY_CLUSTER_SECRET.to_string(),
                ByteString(identity.cluster_secret.as_str().as_bytes().to_vec()),
            ),
            (
                KEY_BOOTSTRAP_PRIV_KEY.to_string(),
                ByteString(identity.keypair.private_key().as_bytes().to_vec()),
            ),
        ])),
        ..Default::default()
    };

    let headless_service = Service {
        metadata: metadata(names.service.clone(), namespace, &names),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(selector(&names)),
            ports: Some(
                SERVICE_PORTS
                    .iter()
                    .map(|p| ServicePort {
                        name: Some(p.name.to_string()),
                        port: p.port,
                        protocol: p.udp.then(|| p.protocol().to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    };

    let external_service = Service {
        metadata: metadata(names.external(), namespace, &names),
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            selector: Some(selector(&names)),
            ports: Some(
                SERVICE_PORTS
                    .iter()
                    .map(|p| ServicePort {
                        name: Some(p.name.to_string()),
                        port: p.port,
                        target_port: Some(IntOrString::Int(p.port)),
                        protocol: p.udp.then(|| p.protocol().to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut stateful_set_meta = metadata(names.service.clone(), namespace, &names);
    stateful_set_meta.annotations = Some(BTreeMap::from([
        (ANNOTATION_TOPOLOGY_ID.to_string(), topology.id().to_string()),
        (
            ANNOTATION_BOOTSTRAP_NODE.to_string(),
            bootstrap_node_id.to_string(),
        ),
    ]));

    let stateful_set = StatefulSet {
        metadata: stateful_set_meta,
        spec: Some(StatefulSetSpec {
            service_name: names.service.clone().into(),
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(selector(&names)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector(&names)),
                    ..Default::default()
                }),
                spec: Some(pod_spec(&names, settings)),
            },
            volume_claim_templates: Some(vec![
                volume_claim(CLUSTER_STORAGE_VOLUME, settings),
                volume_claim(IPFS_STORAGE_VOLUME, settings),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    };

    ResourcePlan {
        names,
        namespace: namespace.to_string(),
        replicas,
        scripts,
        env,
        secret,
        headless_service,
        external_service,
        stateful_set,
    }
}

fn container_ports(ports: &[NamedPort]) -> Vec<ContainerPort> {
    ports
        .iter()
        .map(|p| ContainerPort {
            name: Some(p.name.to_string()),
            container_port: p.port,
            protocol: Some(p.protocol().to_string()),
            ..Default::default()
        })
        .collect()
}

fn mount(volume: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn env_value(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn env_from_config_map(name: &str, config_map: String, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            config_map_key_ref: Some(ConfigMapKeySelector {
                name: config_map.into(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env_from_secret(name: &str, secret: String, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.into(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_spec(names: &ResourceNames, settings: &PlanSettings) -> PodSpec {
    let scripts_mount = mount(SCRIPTS_VOLUME, SCRIPTS_DIR);

    let configure = Container {
        name: "configure-ipfs".to_string(),
        image: Some(settings.ipfs_image.clone()),
        command: Some(vec![
            "sh".to_string(),
            format!("{}/{}", SCRIPTS_DIR, scripts::CONFIGURE_IPFS_KEY),
        ]),
        volume_mounts: Some(vec![
            mount(IPFS_STORAGE_VOLUME, IPFS_DATA_DIR),
            scripts_mount.clone(),
        ]),
        ..Default::default()
    };

    let ipfs = Container {
        name: IPFS_CONTAINER.to_string(),
        image: Some(settings.ipfs_image.clone()),
        env: Some(vec![env_value("IPFS_FD_MAX", "4096")]),
        ports: Some(container_ports(&IPFS_CONTAINER_PORTS)),
        volume_mounts: Some(vec![
            mount(IPFS_STORAGE_VOLUME, IPFS_DATA_DIR),
            scripts_mount.clone(),
        ]),
        ..Default::default()
    };

    let cluster = Container {
        name: CLUSTER_CONTAINER.to_string(),
        image: Some(settings.cluster_image.clone()),
        command: Some(vec![
            "sh".to_string(),
            format!("{}/{}", SCRIPTS_DIR, scripts::ENTRYPOINT_KEY),
        ]),
        env: Some(vec![
            env_from_config_map("BOOTSTRAP_PEER_ID", names.env(), KEY_BOOTSTRAP_PEER_ID),
            env_from_secret(
                "BOOTSTRAP_PEER_PRIV_KEY",
                names.secrets(),
                KEY_BOOTSTRAP_PRIV_KEY,
            ),
            env_from_secret("CLUSTER_SECRET", names.secrets(), KEY_CLUSTER_SECRET),
            env_value("CLUSTER_MONITOR_PING_INTERVAL", "3m"),
            env_value("SVC_NAME", names.service.clone()),
        ]),
        ports: Some(container_ports(&CLUSTER_CONTAINER_PORTS)),
        volume_mounts: Some(vec![
            mount(CLUSTER_STORAGE_VOLUME, CLUSTER_DATA_DIR),
            scripts_mount,
        ]),
        ..Default::default()
    };

    PodSpec {
        init_containers: Some(vec![configure]),
        containers: vec![ipfs, cluster],
        volumes: Some(vec![Volume {
            name: SCRIPTS_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: names.scripts().into(),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn volume_claim(name: &str, settings: &PlanSettings) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: Some(settings.storage_class.clone()),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(settings.storage_size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{DeployPhase, TopologyEdge, TopologyNode, TopologyRecord};
    use chrono::Utc;

    const TOPOLOGY_ID: &str = "3f2a9c1e-7b4d-4e8a-9f00-1234567890ab";

    fn topology(id: &str, nodes: Vec<TopologyNode>, edges: Vec<TopologyEdge>) -> Topology {
        Topology {
            record: TopologyRecord {
                id: id.to_string(),
                name: "demo".to_string(),
                deploy_status: DeployPhase::None,
                namespace: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            nodes,
            edges,
        }
    }

    fn two_node_topology() -> Topology {
        topology(
            TOPOLOGY_ID,
            vec![TopologyNode::bootstrap("a"), TopologyNode::worker("b")],
            vec![TopologyEdge::new("b", "a")],
        )
    }

    fn plan_for(topology: &Topology) -> (ResourcePlan, BootstrapIdentity) {
        let identity = BootstrapIdentity::generate().unwrap();
        let plan = build_plan(
            topology,
            "a",
            &identity,
            "default",
            &PlanSettings::default(),
        );
        (plan, identity)
    }

    fn container<'a>(plan: &'a ResourcePlan, name: &str) -> &'a Container {
        plan.stateful_set
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|s| s.containers.iter().find(|c| c.name == name))
            .expect("container should exist")
    }

    // =========================================================================
    // Naming
    // =========================================================================

    #[test]
    fn service_name_keeps_first_twelve_id_chars() {
        assert_eq!(service_name(TOPOLOGY_ID), "ipfs-3f2a9c1e7b4d");
    }

    #[test]
    fn service_name_lowercases_and_strips_invalid_chars() {
        assert_eq!(service_name("My_Topology.Name-01"), "ipfs-mytopologyna");
    }

    #[test]
    fn short_ids_fall_back_to_hash() {
        let name = service_name("abc");
        assert_eq!(name.len(), SERVICE_PREFIX.len() + SERVICE_SUFFIX_LEN);
        assert!(name[SERVICE_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(name, service_name("abc"));
        assert_ne!(name, service_name("abd"));
        assert_eq!(
            service_name("").len(),
            SERVICE_PREFIX.len() + SERVICE_SUFFIX_LEN
        );
    }

    #[test]
    fn names_are_stable_across_identities() {
        let topology = two_node_topology();
        let (first, id1) = plan_for(&topology);
        let (second, id2) = plan_for(&topology);

        assert_ne!(id1.peer_id(), id2.peer_id());
        assert_eq!(first.names, second.names);
        assert_eq!(first.scripts.metadata.name, second.scripts.metadata.name);
        assert_eq!(first.env.metadata.name, second.env.metadata.name);
        assert_eq!(first.secret.metadata.name, second.secret.metadata.name);
        assert_eq!(
            first.external_service.metadata.name,
            second.external_service.metadata.name
        );
        assert_eq!(
            first.stateful_set.metadata.name,
            second.stateful_set.metadata.name
        );
    }

    #[test]
    fn derived_names_share_the_service_base() {
        let names = ResourceNames::for_topology(TOPOLOGY_ID);
        assert_eq!(names.service(), "ipfs-3f2a9c1e7b4d");
        assert_eq!(names.scripts(), "ipfs-3f2a9c1e7b4d-scripts");
        assert_eq!(names.env(), "ipfs-3f2a9c1e7b4d-env");
        assert_eq!(names.secrets(), "ipfs-3f2a9c1e7b4d-secrets");
        assert_eq!(names.external(), "ipfs-3f2a9c1e7b4d-external");
        assert_eq!(names.selector(), "app=ipfs-3f2a9c1e7b4d");
    }

    #[test]
    fn pod_ordinal_parses_only_own_pods() {
        let names = ResourceNames::for_topology(TOPOLOGY_ID);
        assert_eq!(names.pod_ordinal("ipfs-3f2a9c1e7b4d-0"), Some(0));
        assert_eq!(names.pod_ordinal("ipfs-3f2a9c1e7b4d-12"), Some(12));
        assert_eq!(names.pod_ordinal("ipfs-3f2a9c1e7b4d"), None);
        assert_eq!(names.pod_ordinal("ipfs-ffffffffffff-0"), None);
        assert_eq!(names.pod_ordinal("ipfs-3f2a9c1e7b4d-x"), None);
        assert_eq!(names.pod_ordinal("ipfs-3f2a9c1e7b4d-+0"), None);
        assert_eq!(names.pod_ordinal("ipfs-3f2a9c1e7b4d-01"), None);
        assert_eq!(names.pod_ordinal("ipfs-3f2a9c1e7b4d-"), None);
    }

    // =========================================================================
    // Workload
    // =========================================================================

    #[test]
    fn replicas_match_node_count() {
        let (plan, _) = plan_for(&two_node_topology());
        assert_eq!(plan.replicas, 2);
        assert_eq!(plan.stateful_set.spec.as_ref().unwrap().replicas, Some(2));
    }

    #[test]
    fn replicas_never_drop_below_one() {
        let (plan, _) = plan_for(&topology(TOPOLOGY_ID, vec![], vec![]));
        assert_eq!(plan.replicas, 1);
    }

    #[test]
    fn stateful_set_has_two_volume_claim_templates() {
        let (plan, _) = plan_for(&two_node_topology());
        let claims = plan
            .stateful_set
            .spec
            .as_ref()
            .and_then(|s| s.volume_claim_templates.as_ref())
            .unwrap();

        let names: Vec<_> = claims
            .iter()
            .map(|c| c.metadata.name.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec![CLUSTER_STORAGE_VOLUME, IPFS_STORAGE_VOLUME]);

        for claim in claims {
            let spec = claim.spec.as_ref().unwrap();
            assert_eq!(spec.storage_class_name.as_deref(), Some("standard"));
            let requests = spec.resources.as_ref().unwrap().requests.as_ref().unwrap();
            assert_eq!(requests["storage"], Quantity("30Gi".to_string()));
        }
    }

    #[test]
    fn cluster_container_reads_identity_from_env_and_secret() {
        let (plan, _) = plan_for(&two_node_topology());
        let cluster = container(&plan, CLUSTER_CONTAINER);
        let env = cluster.env.as_ref().unwrap();

        let peer_id = env.iter().find(|e| e.name == "BOOTSTRAP_PEER_ID").unwrap();
        let cm_ref = peer_id
            .value_from
            .as_ref()
            .and_then(|v| v.config_map_key_ref.as_ref())
            .unwrap();
        assert_eq!(cm_ref.key, KEY_BOOTSTRAP_PEER_ID);

        for (var, key) in [
            ("BOOTSTRAP_PEER_PRIV_KEY", KEY_BOOTSTRAP_PRIV_KEY),
            ("CLUSTER_SECRET", KEY_CLUSTER_SECRET),
        ] {
            let entry = env.iter().find(|e| e.name == var).unwrap();
            let secret_ref = entry
                .value_from
                .as_ref()
                .and_then(|v| v.secret_key_ref.as_ref())
                .unwrap();
            assert_eq!(secret_ref.key, key);
        }

        let svc = env.iter().find(|e| e.name == "SVC_NAME").unwrap();
        assert_eq!(svc.value.as_deref(), Some(plan.names.service()));
    }

    #[test]
    fn pod_template_labels_match_selector() {
        let (plan, _) = plan_for(&two_node_topology());
        let spec = plan.stateful_set.spec.as_ref().unwrap();
        let template_labels = spec
            .template
            .metadata
            .as_ref()
            .and_then(|m| m.labels.as_ref())
            .unwrap();
        assert_eq!(spec.selector.match_labels.as_ref(), Some(template_labels));
    }

    #[test]
    fn stateful_set_records_topology_and_bootstrap_node() {
        let (plan, _) = plan_for(&two_node_topology());
        let annotations = plan.stateful_set.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations[ANNOTATION_TOPOLOGY_ID], TOPOLOGY_ID);
        assert_eq!(annotations[ANNOTATION_BOOTSTRAP_NODE], "a");
    }

    // =========================================================================
    // Config and secrets
    // =========================================================================

    #[test]
    fn identity_flows_into_config_and_secret() {
        let (plan, identity) = plan_for(&two_node_topology());

        let env = plan.env.data.as_ref().unwrap();
        assert_eq!(env[KEY_BOOTSTRAP_PEER_ID], identity.peer_id().as_str());

        let secret = plan.secret.data.as_ref().unwrap();
        assert_eq!(
            secret[KEY_CLUSTER_SECRET].0,
            identity.cluster_secret.as_str().as_bytes()
        );
        assert_eq!(
            secret[KEY_BOOTSTRAP_PRIV_KEY].0,
            identity.keypair.private_key().as_bytes()
        );
        assert_eq!(plan.secret.type_.as_deref(), Some("Opaque"));

        let scripts = plan.scripts.data.as_ref().unwrap();
        assert!(scripts[scripts::ENTRYPOINT_KEY].contains(identity.peer_id().as_str()));
        assert!(scripts.contains_key(scripts::CONFIGURE_IPFS_KEY));
    }

    // =========================================================================
    // Services
    // =========================================================================

    #[test]
    fn headless_service_has_no_cluster_ip() {
        let (plan, _) = plan_for(&two_node_topology());
        let spec = plan.headless_service.spec.as_ref().unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.type_, None);
        assert_eq!(spec.ports.as_ref().unwrap().len(), SERVICE_PORTS.len());
    }

    #[test]
    fn external_service_is_load_balancer_with_target_ports() {
        let (plan, _) = plan_for(&two_node_topology());
        let spec = plan.external_service.spec.as_ref().unwrap();
        assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));

        let ports = spec.ports.as_ref().unwrap();
        let udp = ports.iter().find(|p| p.name.as_deref() == Some("swarm-udp")).unwrap();
        assert_eq!(udp.protocol.as_deref(), Some("UDP"));
        assert_eq!(udp.target_port, Some(IntOrString::Int(4002)));
    }

    #[test]
    fn both_services_select_pods_by_service_label() {
        let (plan, _) = plan_for(&two_node_topology());
        let expected = BTreeMap::from([(LABEL_APP.to_string(), plan.names.service().to_string())]);
        for svc in [&plan.headless_service, &plan.external_service] {
            assert_eq!(svc.spec.as_ref().unwrap().selector.as_ref(), Some(&expected));
        }
    }

    #[test]
    fn yaml_lists_objects_in_apply_order() {
        let (plan, _) = plan_for(&two_node_topology());
        let yaml = plan.to_yaml().unwrap();

        let kinds: Vec<&str> = yaml
            .lines()
            .filter_map(|l| l.strip_prefix("kind: "))
            .collect();
        assert_eq!(
            kinds,
            vec![
                "ConfigMap",
                "ConfigMap",
                "Secret",
                "Service",
                "Service",
                "StatefulSet"
            ]
        );
    }
}
