//! Live pod state of a deployed topology

use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use super::{bounded, ClusterClient};
use crate::plan::ResourceNames;
use crate::topology::PodStatus;
use crate::Result;

/// Summarize one pod.
///
/// The node id comes from the pod's StatefulSet ordinal looked up in
/// `node_order`; pods outside that range keep their pod name as node id.
pub fn pod_status(pod: &Pod, names: &ResourceNames, node_order: &[String]) -> PodStatus {
    let pod_name = pod.name_any();
    let node_id = names
        .pod_ordinal(&pod_name)
        .and_then(|ordinal| node_order.get(ordinal))
        .cloned()
        .unwrap_or_else(|| pod_name.clone());

    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);

    PodStatus {
        node_id,
        pod_name,
        phase,
        ready,
    }
}

/// List and summarize every pod of a topology, ordered by ordinal
pub async fn pod_statuses(
    client: &dyn ClusterClient,
    timeout: Duration,
    names: &ResourceNames,
    namespace: &str,
    node_order: &[String],
) -> Result<Vec<PodStatus>> {
    let selector = names.selector();
    let pods = bounded(
        timeout,
        format!("list pods {}", selector),
        client.list_pods(namespace, &selector),
    )
    .await?;

    let mut statuses: Vec<(Option<usize>, PodStatus)> = pods
        .iter()
        .map(|pod| {
            let status = pod_status(pod, names, node_order);
            (names.pod_ordinal(&status.pod_name), status)
        })
        .collect();
    // Unparseable names sort last, by name
    statuses.sort_by(|(a, sa), (b, sb)| match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => sa.pod_name.cmp(&sb.pod_name),
    });

    Ok(statuses.into_iter().map(|(_, s)| s).collect())
}
