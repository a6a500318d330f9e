//! Topology persistence
//!
//! The engine never owns topology records. It reads them and writes only the
//! deploy status and namespace through [`TopologyStore`]. `transition_deploy_status`
//! is a compare-and-set so two processes sharing a store cannot both start a
//! deploy of the same topology.
//!
//! [`MemoryStore`] is the in-process implementation used by the CLI and the
//! integration tests. It also carries the authoring operations (create, update,
//! delete, list) that a database-backed store would expose to the UI.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::topology::{
    DeployPhase, Topology, TopologyDraft, TopologyEdge, TopologyNode, TopologyPatch,
    TopologyRecord, TopologySummary,
};
use crate::{Error, Result};

/// Trait abstracting topology persistence
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TopologyStore: Send + Sync {
    /// Load a topology record, `None` if it does not exist
    async fn get_topology(&self, id: &str) -> Result<Option<TopologyRecord>>;

    /// Nodes of a topology in authoring order
    async fn list_nodes(&self, id: &str) -> Result<Vec<TopologyNode>>;

    /// Edges of a topology
    async fn list_edges(&self, id: &str) -> Result<Vec<TopologyEdge>>;

    /// Unconditionally write the deploy status and namespace
    async fn set_deploy_status(
        &self,
        id: &str,
        status: DeployPhase,
        namespace: Option<String>,
    ) -> Result<()>;

    /// Write the deploy status only if the current one is in `from`.
    ///
    /// Returns `false` without writing when the current status is not in
    /// `from`.
    async fn transition_deploy_status(
        &self,
        id: &str,
        from: &[DeployPhase],
        to: DeployPhase,
        namespace: Option<String>,
    ) -> Result<bool>;
}

/// In-memory topology store
#[derive(Default)]
pub struct MemoryStore {
    topologies: DashMap<String, Topology>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a topology from an authoring document.
    ///
    /// Missing topology, node and edge ids are generated. A fixed topology id
    /// that is already taken is a conflict.
    pub fn create_topology(&self, draft: TopologyDraft) -> Result<Topology> {
        let id = draft.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        let topology = Topology {
            record: TopologyRecord {
                id: id.clone(),
                name: draft.name,
                deploy_status: DeployPhase::None,
                namespace: None,
                created_at: now,
                updated_at: now,
            },
            nodes: with_node_ids(draft.nodes),
            edges: with_edge_ids(draft.edges),
        };

        match self.topologies.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(e) => Err(Error::conflict(format!(
                "topology {} already exists",
                e.key()
            ))),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                debug!(topology = %topology.id(), nodes = topology.nodes.len(), "created topology");
                e.insert(topology.clone());
                Ok(topology)
            }
        }
    }

    /// Load a topology with its graph
    pub fn get(&self, id: &str) -> Option<Topology> {
        self.topologies.get(id).map(|t| t.clone())
    }

    /// Apply a partial update; node and edge sets are replaced wholesale
    pub fn update_topology(&self, id: &str, patch: TopologyPatch) -> Result<Topology> {
        let mut topology = self
            .topologies
            .get_mut(id)
            .ok_or_else(|| Error::TopologyNotFound(id.to_string()))?;

        if let Some(name) = patch.name {
            topology.record.name = name;
        }
        if let Some(nodes) = patch.nodes {
            topology.nodes = with_node_ids(nodes);
        }
        if let Some(edges) = patch.edges {
            topology.edges = with_edge_ids(edges);
        }
        topology.record.updated_at = Utc::now();

        Ok(topology.clone())
    }

    /// Remove a topology and its graph
    pub fn delete_topology(&self, id: &str) -> Result<()> {
        self.topologies
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::TopologyNotFound(id.to_string()))
    }

    /// Summaries of every topology, newest first
    pub fn list_topologies(&self) -> Vec<TopologySummary> {
        let mut summaries: Vec<TopologySummary> = self
            .topologies
            .iter()
            .map(|t| TopologySummary {
                topology_id: t.record.id.clone(),
                name: t.record.name.clone(),
                node_count: t.nodes.len(),
                edge_count: t.edges.len(),
                deploy_status: t.record.deploy_status,
                created_at: t.record.created_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    fn require(&self, id: &str) -> Result<dashmap::mapref::one::RefMut<'_, String, Topology>> {
        self.topologies
            .get_mut(id)
            .ok_or_else(|| Error::TopologyNotFound(id.to_string()))
    }
}

fn with_node_ids(nodes: Vec<TopologyNode>) -> Vec<TopologyNode> {
    nodes
        .into_iter()
        .map(|mut n| {
            if n.node_id.is_empty() {
                n.node_id = Uuid::new_v4().to_string();
            }
            n
        })
        .collect()
}

fn with_edge_ids(edges: Vec<TopologyEdge>) -> Vec<TopologyEdge> {
    edges
        .into_iter()
        .map(|mut e| {
            if e.edge_id.is_empty() {
                e.edge_id = Uuid::new_v4().to_string();
            }
            e
        })
        .collect()
}

#[async_trait]
impl TopologyStore for MemoryStore {
    async fn get_topology(&self, id: &str) -> Result<Option<TopologyRecord>> {
        Ok(self.topologies.get(id).map(|t| t.record.clone()))
    }

    async fn list_nodes(&self, id: &str) -> Result<Vec<TopologyNode>> {
        Ok(self
            .topologies
            .get(id)
            .map(|t| t.nodes.clone())
            .unwrap_or_default())
    }

    async fn list_edges(&self, id: &str) -> Result<Vec<TopologyEdge>> {
        Ok(self
            .topologies
            .get(id)
            .map(|t| t.edges.clone())
            .unwrap_or_default())
    }

    async fn set_deploy_status(
        &self,
        id: &str,
        status: DeployPhase,
        namespace: Option<String>,
    ) -> Result<()> {
        let mut topology = self.require(id)?;
        topology.record.deploy_status = status;
        topology.record.namespace = namespace;
        topology.record.updated_at = Utc::now();
        Ok(())
    }

    async fn transition_deploy_status(
        &self,
        id: &str,
        from: &[DeployPhase],
        to: DeployPhase,
        namespace: Option<String>,
    ) -> Result<bool> {
        // get_mut holds the shard lock, so check and write are atomic
        let mut topology = self.require(id)?;
        if !from.contains(&topology.record.deploy_status) {
            return Ok(false);
        }
        topology.record.deploy_status = to;
        topology.record.namespace = namespace;
        topology.record.updated_at = Utc::now();
        Ok(true)
    }
}
