//! ipfs-topology - deploy IPFS network topologies onto Kubernetes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ipfs_topology::cluster::{create_client, KubeClusterClient};
use ipfs_topology::config::EngineConfig;
use ipfs_topology::controller::TopologyController;
use ipfs_topology::identity::BootstrapIdentity;
use ipfs_topology::plan::build_plan;
use ipfs_topology::store::{MemoryStore, TopologyStore};
use ipfs_topology::topology::{resolve_bootstrap, DeployPhase, TopologyDraft};

/// ipfs-topology - deploy user-authored IPFS network topologies onto Kubernetes
#[derive(Parser, Debug)]
#[command(name = "ipfs-topology", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    engine: EngineConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the Kubernetes objects of a topology as YAML without deploying
    Plan(TargetArgs),

    /// Create every object of a topology in the cluster
    Deploy(TargetArgs),

    /// Delete every object of a deployed topology
    Undeploy(TargetArgs),

    /// Show the deploy status and live pods of a topology
    Status(TargetArgs),

    /// Print the logs of one pod of a topology
    Logs(LogsArgs),
}

/// Topology document and target namespace
#[derive(Args, Debug)]
struct TargetArgs {
    /// Topology document (YAML or JSON)
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Namespace to deploy to, or the namespace the topology was deployed to
    #[arg(short = 'n', long)]
    namespace: Option<String>,
}

#[derive(Args, Debug)]
struct LogsArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Pod name (`<service>-<ordinal>`)
    #[arg(long)]
    pod: String,

    /// Container name (`ipfs` or `ipfs-cluster`)
    #[arg(short = 'c', long)]
    container: Option<String>,

    /// Only print the last N lines
    #[arg(long)]
    tail: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider - FIPS-validated aws-lc-rs
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install FIPS-validated crypto provider: {:?}",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    // Logs go to stderr so plan and status output can be piped
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());
    if cli.engine.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    cli.engine
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    match cli.command {
        Commands::Plan(args) => run_plan(&cli.engine, args).await,
        Commands::Deploy(args) => run_deploy(&cli.engine, args).await,
        Commands::Undeploy(args) => run_undeploy(&cli.engine, args).await,
        Commands::Status(args) => run_status(&cli.engine, args).await,
        Commands::Logs(args) => run_logs(&cli.engine, args).await,
    }
}

/// Parse a topology document; JSON is valid YAML
async fn read_draft(path: &Path) -> anyhow::Result<TopologyDraft> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read topology file {:?}: {}", path, e))?;
    serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse topology file {:?}: {}", path, e))
}

/// Seed an in-memory store with the document.
///
/// Commands acting on an existing deployment need a fixed `topologyId`, since
/// every object name is derived from it. With `recorded_namespace` set the
/// topology is recorded as running in that namespace.
async fn seed_store(
    args: &TargetArgs,
    require_id: bool,
    recorded_namespace: Option<String>,
) -> anyhow::Result<(Arc<MemoryStore>, String)> {
    let draft = read_draft(&args.file).await?;
    if require_id && draft.id.is_none() {
        anyhow::bail!(
            "topology file {:?} must set topologyId for this command",
            args.file
        );
    }

    let store = Arc::new(MemoryStore::new());
    let topology = store.create_topology(draft)?;
    let id = topology.id().to_string();
    if let Some(ns) = recorded_namespace {
        store
            .set_deploy_status(&id, DeployPhase::Running, Some(ns))
            .await?;
    }
    Ok((store, id))
}

async fn controller(
    engine: &EngineConfig,
    store: Arc<MemoryStore>,
) -> anyhow::Result<TopologyController> {
    let client = create_client(engine.kubeconfig.as_deref()).await?;
    Ok(TopologyController::builder(
        store,
        Arc::new(KubeClusterClient::new(client)),
        engine.default_namespace.clone(),
    )
    .api_timeout(engine.api_timeout())
    .plan_settings(engine.plan_settings())
    .build())
}

async fn run_plan(engine: &EngineConfig, args: TargetArgs) -> anyhow::Result<()> {
    let (store, id) = seed_store(&args, false, None).await?;
    let topology = store
        .get(&id)
        .ok_or_else(|| anyhow::anyhow!("topology {} vanished from the store", id))?;

    let bootstrap = resolve_bootstrap(&topology.nodes, &topology.edges)?;
    let identity = BootstrapIdentity::generate()?;
    let namespace = args
        .namespace
        .unwrap_or_else(|| engine.default_namespace.clone());
    let plan = build_plan(
        &topology,
        bootstrap,
        &identity,
        &namespace,
        &engine.plan_settings(),
    );

    print!("{}", plan.to_yaml()?);
    Ok(())
}

async fn run_deploy(engine: &EngineConfig, args: TargetArgs) -> anyhow::Result<()> {
    let (store, id) = seed_store(&args, false, None).await?;
    let controller = controller(engine, store).await?;

    let result = controller.deploy(&id, args.namespace.as_deref()).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_undeploy(engine: &EngineConfig, args: TargetArgs) -> anyhow::Result<()> {
    let (store, id) = seed_store(&args, true, args.namespace.clone()).await?;
    let controller = controller(engine, store).await?;

    controller.undeploy(&id).await?;
    println!("Topology {} undeployed", id);
    Ok(())
}

async fn run_status(engine: &EngineConfig, args: TargetArgs) -> anyhow::Result<()> {
    let (store, id) = seed_store(&args, true, args.namespace.clone()).await?;
    let controller = controller(engine, store).await?;

    let status = controller.status(&id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn run_logs(engine: &EngineConfig, args: LogsArgs) -> anyhow::Result<()> {
    let (store, id) = seed_store(&args.target, true, args.target.namespace.clone()).await?;
    let controller = controller(engine, store).await?;

    let logs = controller
        .pod_logs(&id, &args.pod, args.container, args.tail)
        .await?;
    print!("{}", logs);
    Ok(())
}
