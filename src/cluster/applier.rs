//! Ordered creation and teardown of a topology's objects

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use tracing::{info, warn};

use super::{bounded, ClusterClient, ResourceKind};
use crate::error::TeardownFailure;
use crate::plan::{ResourceNames, ResourcePlan};
use crate::{Error, Result};

/// What an apply pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Objects created by this pass
    pub created: Vec<String>,
    /// Objects that already existed and were left untouched
    pub existing: Vec<String>,
}

/// Creates and deletes the objects of a [`ResourcePlan`]
pub struct Applier {
    client: Arc<dyn ClusterClient>,
    timeout: Duration,
}

impl Applier {
    /// Create an applier with a per-call deadline
    pub fn new(client: Arc<dyn ClusterClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Create every object of the plan.
    ///
    /// Configuration goes first so the StatefulSet's pods never start without
    /// their scripts and credentials. Objects that already exist are kept as
    /// they are. The first other failure stops the pass; objects created
    /// before it are left in place for undeploy to clean up.
    pub async fn apply(&self, plan: &ResourcePlan) -> Result<ApplyReport> {
        let ns = plan.namespace.as_str();
        let client = &self.client;
        let mut report = ApplyReport::default();

        self.step(
            &mut report,
            ResourceKind::ConfigMap,
            plan.scripts.name_any(),
            client.create_config_map(ns, &plan.scripts),
        )
        .await?;
        self.step(
            &mut report,
            ResourceKind::ConfigMap,
            plan.env.name_any(),
            client.create_config_map(ns, &plan.env),
        )
        .await?;
        self.step(
            &mut report,
            ResourceKind::Secret,
            plan.secret.name_any(),
            client.create_secret(ns, &plan.secret),
        )
        .await?;
        self.step(
            &mut report,
            ResourceKind::Service,
            plan.headless_service.name_any(),
            client.create_service(ns, &plan.headless_service),
        )
        .await?;
        self.step(
            &mut report,
            ResourceKind::Service,
            plan.external_service.name_any(),
            client.create_service(ns, &plan.external_service),
        )
        .await?;
        self.step(
            &mut report,
            ResourceKind::StatefulSet,
            plan.stateful_set.name_any(),
            client.create_stateful_set(ns, &plan.stateful_set),
        )
        .await?;

        info!(
            namespace = ns,
            service = plan.names.service(),
            created = report.created.len(),
            existing = report.existing.len(),
            "applied resource plan"
        );
        Ok(report)
    }

    async fn step<F>(
        &self,
        report: &mut ApplyReport,
        kind: ResourceKind,
        name: String,
        create: F,
    ) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        let label = format!("{} {}", kind, name);
        match bounded(self.timeout, format!("create {}", label), create).await {
            Ok(()) => {
                report.created.push(label);
                Ok(())
            }
            Err(Error::AlreadyExists { .. }) => {
                info!(%kind, %name, "already exists, keeping it");
                report.existing.push(label);
                Ok(())
            }
            Err(e) => {
                warn!(%kind, %name, error = %e, "create failed");
                Err(e)
            }
        }
    }

    /// Delete every object a topology may own.
    ///
    /// All six deletes are attempted even when some fail. Objects that are
    /// already gone count as deleted.
    pub async fn teardown(&self, names: &ResourceNames, namespace: &str) -> Result<()> {
        let targets = [
            (ResourceKind::StatefulSet, names.service().to_string()),
            (ResourceKind::Service, names.service().to_string()),
            (ResourceKind::Service, names.external()),
            (ResourceKind::ConfigMap, names.scripts()),
            (ResourceKind::ConfigMap, names.env()),
            (ResourceKind::Secret, names.secrets()),
        ];

        let mut failures = Vec::new();
        for (kind, name) in targets {
            let result = bounded(
                self.timeout,
                format!("delete {} {}", kind, name),
                self.client.delete(namespace, kind, &name),
            )
            .await;

            match result {
                Ok(()) | Err(Error::NotFound { .. }) => {}
                Err(e) => {
                    warn!(%kind, %name, namespace, error = %e, "delete failed");
                    failures.push(TeardownFailure {
                        kind: kind.to_string(),
                        name,
                        message: e.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            info!(namespace, service = names.service(), "teardown complete");
            Ok(())
        } else {
            Err(Error::Teardown { failures })
        }
    }
}
