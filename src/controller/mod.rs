//! Deployment lifecycle controller
//!
//! Coordinates the store, identity generation, plan building and the cluster
//! for the four operations exposed to callers: deploy, undeploy, status and
//! pod logs.
//!
//! Status moves `none|error -> deploying -> running|error` on deploy and
//! `none|running|error -> none` on undeploy. Operations on the same topology
//! are serialized in-process by a per-topology mutex and across processes by
//! the store's compare-and-set on the status field.
//!
//! A deploy whose outcome cannot be written back leaves `deploying` behind.
//! Undeploy clears it: holding the topology's mutex means no deploy of it is
//! running in this process.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

use crate::cluster::{bounded, pod_statuses, Applier, ClusterClient};
use crate::identity::BootstrapIdentity;
use crate::plan::{build_plan, PlanSettings, ResourceNames};
use crate::store::TopologyStore;
use crate::topology::{
    node_order, resolve_bootstrap, DeployPhase, DeployResult, DeployStatus, Topology,
    TopologyRecord,
};
use crate::{Error, Result, DEFAULT_API_TIMEOUT};

/// Message returned by a successful deploy call
pub const DEPLOY_STARTED: &str = "Deployment started";

/// Drives topologies through their deploy lifecycle
pub struct TopologyController {
    store: Arc<dyn TopologyStore>,
    cluster: Arc<dyn ClusterClient>,
    applier: Applier,
    settings: PlanSettings,
    default_namespace: String,
    api_timeout: Duration,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Builder for [`TopologyController`]
pub struct TopologyControllerBuilder {
    store: Arc<dyn TopologyStore>,
    cluster: Arc<dyn ClusterClient>,
    settings: PlanSettings,
    default_namespace: String,
    api_timeout: Duration,
}

impl TopologyControllerBuilder {
    /// Deadline of each individual cluster call
    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = timeout;
        self
    }

    /// Images and storage of deployed peers
    pub fn plan_settings(mut self, settings: PlanSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the controller
    pub fn build(self) -> TopologyController {
        TopologyController {
            applier: Applier::new(self.cluster.clone(), self.api_timeout),
            store: self.store,
            cluster: self.cluster,
            settings: self.settings,
            default_namespace: self.default_namespace,
            api_timeout: self.api_timeout,
            locks: DashMap::new(),
        }
    }
}

impl TopologyController {
    /// Start building a controller over a store and a cluster.
    ///
    /// `default_namespace` is used when a deploy names no namespace and when a
    /// record has none stored.
    pub fn builder(
        store: Arc<dyn TopologyStore>,
        cluster: Arc<dyn ClusterClient>,
        default_namespace: impl Into<String>,
    ) -> TopologyControllerBuilder {
        TopologyControllerBuilder {
            store,
            cluster,
            settings: PlanSettings::default(),
            default_namespace: default_namespace.into(),
            api_timeout: DEFAULT_API_TIMEOUT,
        }
    }

    async fn lock(&self, id: &str) -> TopologyLock<'_> {
        let mutex = self.locks.entry(id.to_string()).or_default().clone();
        TopologyLock {
            locks: &self.locks,
            id: id.to_string(),
            guard: Some(mutex.lock_owned().await),
        }
    }

    async fn load_record(&self, id: &str) -> Result<TopologyRecord> {
        self.store
            .get_topology(id)
            .await?
            .ok_or_else(|| Error::TopologyNotFound(id.to_string()))
    }

    async fn load(&self, id: &str) -> Result<Topology> {
        let record = self.load_record(id).await?;
        let nodes = self.store.list_nodes(id).await?;
        let edges = self.store.list_edges(id).await?;
        Ok(Topology {
            record,
            nodes,
            edges,
        })
    }

    fn namespace_of(&self, record: &TopologyRecord) -> String {
        record
            .namespace
            .clone()
            .unwrap_or_else(|| self.default_namespace.clone())
    }

    /// Deploy a topology into `namespace`, or the default namespace.
    ///
    /// Graph problems are reported before the status is touched. Once the
    /// status is `deploying`, any failure is recorded as `error`; resources
    /// created before the failure stay in the cluster.
    #[instrument(skip(self), fields(topology = %id))]
    pub async fn deploy(&self, id: &str, namespace: Option<&str>) -> Result<DeployResult> {
        let _lock = self.lock(id).await;

        let topology = self.load(id).await?;
        let bootstrap = resolve_bootstrap(&topology.nodes, &topology.edges)?.to_string();
        let namespace = namespace
            .map(str::to_string)
            .unwrap_or_else(|| self.default_namespace.clone());

        let started = self
            .store
            .transition_deploy_status(
                id,
                &DeployPhase::DEPLOYABLE,
                DeployPhase::Deploying,
                Some(namespace.clone()),
            )
            .await?;
        if !started {
            let current = self
                .store
                .get_topology(id)
                .await?
                .map(|r| r.deploy_status)
                .unwrap_or(topology.record.deploy_status);
            return Err(Error::conflict(format!(
                "topology {} cannot be deployed while {}",
                id, current
            )));
        }

        info!(
            namespace = %namespace,
            bootstrap = %bootstrap,
            nodes = topology.nodes.len(),
            "deploying topology"
        );

        match self.realize(&topology, &bootstrap, &namespace).await {
            Ok(()) => {
                info!(namespace = %namespace, "topology deployed");
                Ok(DeployResult {
                    topology_id: id.to_string(),
                    status: DeployPhase::Deploying,
                    message: DEPLOY_STARTED.to_string(),
                })
            }
            Err(e) => {
                error!(namespace = %namespace, error = %e, "deploy failed");
                match self
                    .store
                    .set_deploy_status(id, DeployPhase::Error, Some(namespace))
                    .await
                {
                    Ok(()) => Err(e),
                    Err(store_err) => {
                        error!(
                            error = %store_err,
                            "failed to record deploy error; status is stale"
                        );
                        Err(Error::stale_status(id, e, store_err))
                    }
                }
            }
        }
    }

    async fn realize(&self, topology: &Topology, bootstrap: &str, namespace: &str) -> Result<()> {
        let identity = BootstrapIdentity::generate()?;
        let plan = build_plan(topology, bootstrap, &identity, namespace, &self.settings);
        self.applier.apply(&plan).await?;
        self.store
            .set_deploy_status(
                topology.id(),
                DeployPhase::Running,
                Some(namespace.to_string()),
            )
            .await
    }

    /// Remove every object of a topology and reset its status.
    ///
    /// A `deploying` status found under the topology's lock was left by a
    /// deploy that could not record its outcome, and is cleared like any
    /// other. When any delete fails the status is left as it was and the
    /// aggregated error is returned.
    #[instrument(skip(self), fields(topology = %id))]
    pub async fn undeploy(&self, id: &str) -> Result<()> {
        let _lock = self.lock(id).await;

        let record = self.load_record(id).await?;
        let from: &[DeployPhase] = if record.deploy_status == DeployPhase::Deploying {
            warn!("clearing stale deploying status");
            &DeployPhase::RECOVERABLE
        } else {
            &DeployPhase::UNDEPLOYABLE
        };

        let namespace = self.namespace_of(&record);
        let names = ResourceNames::for_topology(id);
        info!(namespace = %namespace, service = names.service(), "undeploying topology");

        self.applier.teardown(&names, &namespace).await?;

        let reset = self
            .store
            .transition_deploy_status(id, from, DeployPhase::None, None)
            .await?;
        if !reset {
            return Err(Error::conflict(format!(
                "topology {} started deploying during undeploy",
                id
            )));
        }
        Ok(())
    }

    /// Persisted status plus live pod state.
    ///
    /// A failing cluster query is reported in `message` with no pods rather
    /// than as an error.
    #[instrument(skip(self), fields(topology = %id))]
    pub async fn status(&self, id: &str) -> Result<DeployStatus> {
        let topology = self.load(id).await?;
        let namespace = self.namespace_of(&topology.record);
        let names = ResourceNames::for_topology(id);

        // The graph may have been edited into an unresolvable state since deploy
        let order = match resolve_bootstrap(&topology.nodes, &topology.edges) {
            Ok(bootstrap) => node_order(&topology.nodes, bootstrap),
            Err(_) => topology.nodes.iter().map(|n| n.node_id.clone()).collect(),
        };

        let (pods, message) = match pod_statuses(
            self.cluster.as_ref(),
            self.api_timeout,
            &names,
            &namespace,
            &order,
        )
        .await
        {
            Ok(pods) => (pods, None),
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "failed to list pods");
                (Vec::new(), Some(e.to_string()))
            }
        };

        Ok(DeployStatus {
            topology_id: id.to_string(),
            status: topology.record.deploy_status,
            message,
            pods,
        })
    }

    /// Logs of one pod of a topology
    #[instrument(skip(self), fields(topology = %id))]
    pub async fn pod_logs(
        &self,
        id: &str,
        pod: &str,
        container: Option<String>,
        tail_lines: Option<i64>,
    ) -> Result<String> {
        let record = self.load_record(id).await?;
        let names = ResourceNames::for_topology(id);
        if names.pod_ordinal(pod).is_none() {
            return Err(Error::validation(format!(
                "pod {} does not belong to topology {}",
                pod, id
            )));
        }

        let namespace = self.namespace_of(&record);
        bounded(
            self.api_timeout,
            format!("read logs of pod {}", pod),
            self.cluster.pod_logs(&namespace, pod, container, tail_lines),
        )
        .await
    }
}

/// Held per-topology mutex; drops its map entry once nobody else wants it
struct TopologyLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TopologyLock<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference
        self.guard.take();
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
