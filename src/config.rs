//! Engine configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::plan::PlanSettings;
use crate::{Error, Result};

/// Settings shared by every CLI command that talks to the engine
#[derive(Args, Clone, Debug)]
pub struct EngineConfig {
    /// Namespace used when a topology has none recorded
    #[arg(long, env = "IPFS_TOPOLOGY_NAMESPACE")]
    pub default_namespace: String,

    /// Path to a kubeconfig file (in-cluster or ~/.kube/config when unset)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Deadline of each Kubernetes API call, in seconds
    #[arg(long, env = "IPFS_TOPOLOGY_API_TIMEOUT_SECS", default_value = "30")]
    pub api_timeout_secs: u64,

    /// kubo image
    #[arg(long, env = "IPFS_TOPOLOGY_IPFS_IMAGE", default_value = "ipfs/kubo:release")]
    pub ipfs_image: String,

    /// ipfs-cluster image
    #[arg(
        long,
        env = "IPFS_TOPOLOGY_CLUSTER_IMAGE",
        default_value = "ipfs/ipfs-cluster:latest"
    )]
    pub cluster_image: String,

    /// StorageClass of peer volumes
    #[arg(long, env = "IPFS_TOPOLOGY_STORAGE_CLASS", default_value = "standard")]
    pub storage_class: String,

    /// Size of each peer volume
    #[arg(long, env = "IPFS_TOPOLOGY_STORAGE_SIZE", default_value = "30Gi")]
    pub storage_size: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "IPFS_TOPOLOGY_LOG_JSON")]
    pub log_json: bool,
}

impl EngineConfig {
    /// Reject settings the API server would refuse later
    pub fn validate(&self) -> Result<()> {
        if !is_dns1123_label(&self.default_namespace) {
            return Err(Error::config(format!(
                "default namespace {:?} is not a valid DNS-1123 label",
                self.default_namespace
            )));
        }
        if self.api_timeout_secs == 0 {
            return Err(Error::config("api timeout must be at least one second"));
        }
        for (flag, value) in [
            ("ipfs-image", &self.ipfs_image),
            ("cluster-image", &self.cluster_image),
            ("storage-class", &self.storage_class),
            ("storage-size", &self.storage_size),
        ] {
            if value.trim().is_empty() {
                return Err(Error::config(format!("--{} must not be empty", flag)));
            }
        }
        Ok(())
    }

    /// Per-call API deadline
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Images and storage for the plan builder
    pub fn plan_settings(&self) -> PlanSettings {
        PlanSettings {
            ipfs_image: self.ipfs_image.clone(),
            cluster_image: self.cluster_image.clone(),
            storage_class: self.storage_class.clone(),
            storage_size: self.storage_size.clone(),
        }
    }
}

fn is_dns1123_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}
