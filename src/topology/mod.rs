//! Topology data model
//!
//! A topology is a user-authored graph: nodes are simulated IPFS peers and a
//! directed edge `source -> target` means "source bootstraps to target".
//! Records are owned by the [`crate::store::TopologyStore`]; the engine only
//! borrows them for the duration of a deploy, undeploy or status call.

mod resolver;

pub use resolver::{node_order, resolve_bootstrap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse deployment state persisted with the topology record
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeployPhase {
    /// Nothing is deployed
    #[default]
    None,
    /// Cluster resources are being created
    Deploying,
    /// Every resource was created
    Running,
    /// The last deploy failed
    Error,
}

impl DeployPhase {
    /// Whether the status field may move from `self` to `next`.
    ///
    /// Deploy moves `none|error -> deploying -> running|error`; undeploy moves
    /// `none|running|error -> none`. Undeploy also clears `deploying` when it
    /// holds the topology's lock, since the deploy that wrote it is gone.
    pub fn can_transition_to(self, next: DeployPhase) -> bool {
        use DeployPhase::*;
        matches!(
            (self, next),
            (None, Deploying)
                | (Error, Deploying)
                | (Deploying, Running)
                | (Deploying, Error)
                | (Running, None)
                | (Error, None)
                | (None, None)
                | (Deploying, None)
        )
    }

    /// Phases from which a deploy may start
    pub const DEPLOYABLE: [DeployPhase; 2] = [DeployPhase::None, DeployPhase::Error];

    /// Phases from which an undeploy may start
    pub const UNDEPLOYABLE: [DeployPhase; 3] =
        [DeployPhase::None, DeployPhase::Running, DeployPhase::Error];

    /// Phases an undeploy resets when it finds a stale `deploying` status
    pub const RECOVERABLE: [DeployPhase; 4] = [
        DeployPhase::None,
        DeployPhase::Deploying,
        DeployPhase::Running,
        DeployPhase::Error,
    ];
}

impl std::fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Deploying => write!(f, "deploying"),
            Self::Running => write!(f, "running"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Role a node plays in the simulated network
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Entry node every other node joins through
    Bootstrap,
    /// Regular peer
    #[default]
    Worker,
}

/// Canvas position of a node (display only)
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

/// A logical peer in the topology
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyNode {
    /// Unique within the topology
    #[serde(default)]
    pub node_id: String,
    /// Human readable label
    #[serde(default)]
    pub label: String,
    /// Canvas position
    #[serde(default)]
    pub position: Position,
    /// Role, defaults to worker
    #[serde(default)]
    pub role: NodeRole,
}

impl TopologyNode {
    /// Create a worker node with the given id
    pub fn worker(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            label: node_id.clone(),
            node_id,
            position: Position::default(),
            role: NodeRole::Worker,
        }
    }

    /// Create a node explicitly tagged as bootstrap
    pub fn bootstrap(node_id: impl Into<String>) -> Self {
        Self {
            role: NodeRole::Bootstrap,
            ..Self::worker(node_id)
        }
    }
}

/// A directed "connects to" edge
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyEdge {
    /// Unique within the topology
    #[serde(default)]
    pub edge_id: String,
    /// Node that bootstraps
    pub source_node_id: String,
    /// Node being bootstrapped to
    pub target_node_id: String,
}

impl TopologyEdge {
    /// Create an edge `source -> target` with a derived id
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source_node_id = source.into();
        let target_node_id = target.into();
        Self {
            edge_id: format!("{}-{}", source_node_id, target_node_id),
            source_node_id,
            target_node_id,
        }
    }
}

/// Topology row without its nodes and edges
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyRecord {
    /// Opaque topology id
    #[serde(rename = "topologyId")]
    pub id: String,
    /// Display name
    pub name: String,
    /// Persisted deploy status
    pub deploy_status: DeployPhase,
    /// Namespace the topology was last deployed to
    #[serde(rename = "k8sNamespace", default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// A topology with its graph
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    /// Record fields
    #[serde(flatten)]
    pub record: TopologyRecord,
    /// Nodes in authoring order
    #[serde(default)]
    pub nodes: Vec<TopologyNode>,
    /// Edges
    #[serde(default)]
    pub edges: Vec<TopologyEdge>,
}

impl Topology {
    /// Topology id
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// Authoring document accepted by the CLI and by [`crate::store::MemoryStore::create_topology`]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyDraft {
    /// Optional fixed id; a UUID is generated when absent
    #[serde(default, rename = "topologyId", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Nodes
    #[serde(default)]
    pub nodes: Vec<TopologyNode>,
    /// Edges
    #[serde(default)]
    pub edges: Vec<TopologyEdge>,
}

/// Partial update of a topology; `None` fields are left untouched
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyPatch {
    /// New display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement node set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<TopologyNode>>,
    /// Replacement edge set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<TopologyEdge>>,
}

/// List view of a topology
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopologySummary {
    /// Topology id
    pub topology_id: String,
    /// Display name
    pub name: String,
    /// Number of nodes
    pub node_count: usize,
    /// Number of edges
    pub edge_count: usize,
    /// Persisted deploy status
    pub deploy_status: DeployPhase,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Response of a deploy call
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    /// Topology id
    pub topology_id: String,
    /// Status reported to the caller
    pub status: DeployPhase,
    /// Human readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Live state of one pod
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    /// Topology node the pod realizes
    pub node_id: String,
    /// Pod name
    pub pod_name: String,
    /// Pod phase (Pending, Running, ...)
    pub phase: String,
    /// Whether the pod reports Ready=True
    pub ready: bool,
}

/// Response of a status call
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeployStatus {
    /// Topology id
    pub topology_id: String,
    /// Persisted coarse status
    pub status: DeployPhase,
    /// Error from the cluster query, if it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Live pods, empty when none exist
    #[serde(default)]
    pub pods: Vec<PodStatus>,
}
