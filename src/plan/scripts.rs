//! Init and runtime scripts mounted into every IPFS peer
//!
//! Both scripts are shell templates embedded at compile time and rendered
//! with a typed context, so the rendered text is a pure function of the
//! service name and the bootstrap peer id.

use minijinja::Environment;
use serde::Serialize;

use super::{CLUSTER_SWARM_PORT, IPFS_API_PORT, IPFS_DATA_DIR, IPFS_GATEWAY_PORT};

/// ipfs-cluster entrypoint: bootstrap mode on ordinal 0, join mode elsewhere
const ENTRYPOINT_TEMPLATE: &str = include_str!("../../templates/entrypoint.sh");

/// kubo init container script
const CONFIGURE_IPFS_TEMPLATE: &str = include_str!("../../templates/configure-ipfs.sh");

/// Maximum datastore size configured on every kubo repo
const IPFS_STORAGE_MAX: &str = "100GB";

/// ConfigMap key of the entrypoint script
pub const ENTRYPOINT_KEY: &str = "entrypoint.sh";

/// ConfigMap key of the init script
pub const CONFIGURE_IPFS_KEY: &str = "configure-ipfs.sh";

#[derive(Serialize)]
struct EntrypointContext<'a> {
    service_name: &'a str,
    bootstrap_host: String,
    bootstrap_peer_id: &'a str,
    cluster_swarm_port: i32,
}

#[derive(Serialize)]
struct ConfigureIpfsContext {
    data_dir: &'static str,
    api_port: i32,
    gateway_port: i32,
    storage_max: &'static str,
}

fn render<S: Serialize>(name: &str, template: &str, ctx: S) -> String {
    let mut env = Environment::new();
    env.add_template(name, template)
        .expect("embedded script template is valid");
    env.get_template(name)
        .expect("template was just added")
        .render(ctx)
        .expect("script context matches template")
}

/// Render the ipfs-cluster entrypoint.
///
/// The pod whose hostname is `<service>-0` starts with the bootstrap identity;
/// every other pod joins it through the headless service DNS name.
pub fn entrypoint_script(service_name: &str, bootstrap_peer_id: &str) -> String {
    render(
        ENTRYPOINT_KEY,
        ENTRYPOINT_TEMPLATE,
        EntrypointContext {
            service_name,
            bootstrap_host: format!("{}-0", service_name),
            bootstrap_peer_id,
            cluster_swarm_port: CLUSTER_SWARM_PORT,
        },
    )
}

/// Render the kubo repository init script
pub fn configure_ipfs_script() -> String {
    render(
        CONFIGURE_IPFS_KEY,
        CONFIGURE_IPFS_TEMPLATE,
        ConfigureIpfsContext {
            data_dir: IPFS_DATA_DIR,
            api_port: IPFS_API_PORT,
            gateway_port: IPFS_GATEWAY_PORT,
            storage_max: IPFS_STORAGE_MAX,
        },
    )
}
