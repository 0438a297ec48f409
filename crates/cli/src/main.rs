//! `shipyard` CLI entry-point.
//!
//! Available sub-commands:
//! - `lint`: validate every job of a workflow file.
//! - `plan`: expand a workflow into tasks against a cluster snapshot.
//! - `reconcile`: reconcile a workflow's selections with a newer revision.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cluster::snapshot::{ClusterSnapshot, SnapshotResolver};
use engine::{
    JobRegistry, LicenseTier, LifecycleContext, MemoryWorkflowStore, StaticLicense,
    WorkflowController, WorkflowDefinition,
};

#[derive(Parser)]
#[command(
    name = "shipyard",
    about = "Canary deployment workflow tooling",
    version
)]
struct Cli {
    /// License tier used by pre-save validation.
    #[arg(long, global = true, env = "SHIPYARD_LICENSE_TIER", default_value = "community")]
    license_tier: LicenseTier,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate every job of a workflow definition.
    Lint {
        /// Path to the workflow YAML/JSON file.
        path: PathBuf,
    },
    /// Generate the tasks a trigger would run, resolved against a snapshot.
    Plan {
        /// Path to the workflow YAML/JSON file.
        path: PathBuf,
        /// Cluster snapshot to resolve services and deployments from.
        #[arg(long, env = "SHIPYARD_CLUSTER_SNAPSHOT")]
        cluster_snapshot: PathBuf,
        /// Task sequence number of the trigger.
        #[arg(long, default_value_t = 1)]
        task_id: i64,
    },
    /// Reconcile job selections with the latest saved revision.
    Reconcile {
        /// Path to the workflow being edited.
        path: PathBuf,
        /// Path to the latest saved revision of the same workflow.
        #[arg(long)]
        latest: PathBuf,
    },
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("invalid document {}", path.display()))
}

fn controller(
    store: Arc<MemoryWorkflowStore>,
    clusters: SnapshotResolver,
    tier: LicenseTier,
) -> WorkflowController {
    let ctx = LifecycleContext::new(store, Arc::new(clusters), Arc::new(StaticLicense::new(tier)));
    WorkflowController::new(JobRegistry::builtin(), ctx)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Lint { path } => {
            let mut workflow: WorkflowDefinition = load(&path)?;
            let ctl = controller(
                Arc::new(MemoryWorkflowStore::new()),
                SnapshotResolver::default(),
                cli.license_tier,
            );

            ctl.instantiate(&mut workflow)?;
            ctl.lint(&workflow)
                .with_context(|| format!("workflow '{}' failed validation", workflow.name))?;
            info!("workflow '{}' is valid", workflow.name);
        }
        Command::Plan {
            path,
            cluster_snapshot,
            task_id,
        } => {
            let mut workflow: WorkflowDefinition = load(&path)?;
            let snapshot: ClusterSnapshot = load(&cluster_snapshot)?;
            let ctl = controller(
                Arc::new(MemoryWorkflowStore::new()),
                SnapshotResolver::new(snapshot),
                cli.license_tier,
            );

            ctl.instantiate(&mut workflow)?;
            let stages = ctl
                .generate_tasks(&mut workflow, task_id)
                .await
                .with_context(|| format!("cannot plan workflow '{}'", workflow.name))?;
            println!("{}", serde_json::to_string_pretty(&stages)?);
        }
        Command::Reconcile { path, latest } => {
            let mut workflow: WorkflowDefinition = load(&path)?;
            let mut latest: WorkflowDefinition = load(&latest)?;

            let store = Arc::new(MemoryWorkflowStore::new());
            let ctl = controller(store.clone(), SnapshotResolver::default(), cli.license_tier);

            ctl.instantiate(&mut latest)?;
            ctl.instantiate(&mut workflow)?;
            store.save(latest);

            ctl.update_with_latest_setting(&mut workflow).await?;
            print!("{}", serde_yaml::to_string(&workflow)?);
        }
    }

    Ok(())
}
