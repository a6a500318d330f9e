//! Integration stories against a live cluster
//!
//! - `deploy_lifecycle`: deploying a topology, reading its pods and logs, and
//!   tearing it down again through the real API server

mod deploy_lifecycle;
mod helpers;
