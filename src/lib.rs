//! ipfs-topology - deploys user-authored IPFS network topologies onto Kubernetes
//!
//! A topology is a graph of simulated IPFS peers. Deploying it mints a fresh
//! bootstrap identity, renders one ipfs-cluster StatefulSet with its scripts,
//! configuration, secret and services, and creates them in a namespace.
//! Undeploying removes them again; status reports live pod state per node.
//!
//! # Modules
//!
//! - [`topology`] - Data model, bootstrap resolution
//! - [`identity`] - Bootstrap keypair, peer id and cluster secret
//! - [`plan`] - Pure synthesis of the Kubernetes objects
//! - [`cluster`] - Kubernetes client abstraction, applier and pod status
//! - [`store`] - Topology persistence trait and in-memory store
//! - [`controller`] - Deploy lifecycle: deploy, undeploy, status, logs
//! - [`config`] - Engine configuration
//! - [`error`] - Error types

#![deny(missing_docs)]

use std::time::Duration;

pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod plan;
pub mod store;
pub mod topology;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Defaults and well-known keys
// =============================================================================

/// Default deadline of a single Kubernetes API call
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Label selecting every pod of a topology
pub const LABEL_APP: &str = "app";

/// Standard label marking objects created by this engine
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`]
pub const LABEL_MANAGED_BY_VALUE: &str = "ipfs-topology";

/// StatefulSet annotation recording the topology id
pub const ANNOTATION_TOPOLOGY_ID: &str = "ipfs-topology.io/topology-id";

/// StatefulSet annotation recording the bootstrap node id
pub const ANNOTATION_BOOTSTRAP_NODE: &str = "ipfs-topology.io/bootstrap-node";
