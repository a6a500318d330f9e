//! Graph validation and bootstrap resolution
//!
//! Every deployed network has exactly one entry node. It is chosen, in order:
//!
//! 1. the single node explicitly tagged `role: bootstrap`
//! 2. the single node that edges point *to* but that never points anywhere
//! 3. the only node of a one-node topology
//!
//! Anything else is ambiguous and rejected before identity generation or any
//! cluster call takes place.

use std::collections::HashSet;

use super::{NodeRole, TopologyEdge, TopologyNode};
use crate::{Error, Result};

/// Resolve the bootstrap node id of a topology graph
pub fn resolve_bootstrap<'a>(
    nodes: &'a [TopologyNode],
    edges: &[TopologyEdge],
) -> Result<&'a str> {
    if nodes.is_empty() {
        return Err(Error::validation("topology has no nodes"));
    }

    let tagged: Vec<&str> = nodes
        .iter()
        .filter(|n| n.role == NodeRole::Bootstrap)
        .map(|n| n.node_id.as_str())
        .collect();
    match tagged.as_slice() {
        [only] => return Ok(*only),
        [] => {}
        many => {
            return Err(Error::validation(format!(
                "{} nodes are tagged bootstrap ({}); exactly one is allowed",
                many.len(),
                many.join(", ")
            )))
        }
    }

    let sources: HashSet<&str> = edges.iter().map(|e| e.source_node_id.as_str()).collect();
    let targets: HashSet<&str> = edges.iter().map(|e| e.target_node_id.as_str()).collect();

    let sinks: Vec<&str> = nodes
        .iter()
        .map(|n| n.node_id.as_str())
        .filter(|id| targets.contains(id) && !sources.contains(id))
        .collect();
    if let [only] = sinks.as_slice() {
        return Ok(*only);
    }

    if let [only] = nodes {
        return Ok(only.node_id.as_str());
    }

    Err(Error::validation(
        "topology must have exactly one bootstrap node: tag one node as bootstrap \
         or point every edge at a single entry node",
    ))
}

/// Node ids ordered by StatefulSet ordinal: the bootstrap node first, then the
/// remaining nodes in authoring order.
pub fn node_order(nodes: &[TopologyNode], bootstrap_id: &str) -> Vec<String> {
    let mut order = Vec::with_capacity(nodes.len());
    order.push(bootstrap_id.to_string());
    order.extend(
        nodes
            .iter()
            .filter(|n| n.node_id != bootstrap_id)
            .map(|n| n.node_id.clone()),
    );
    order
}
