//! orbitd — the Orbit operator binary.
//!
//! Opens the state and context databases and inspects them:
//! - lifecycle trail of a deployment intent group
//! - every node of a deployment context
//! - registered controllers in call order
//!
//! # Usage
//!
//! ```text
//! orbitd --config /etc/orbit/orbit.toml status --project p --composite-app ca --version v1 --group dig
//! orbitd --data-dir /var/lib/orbit context --id 42
//! orbitd controllers
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use orbit_context::ContextStore;
use orbit_orchestrator::{LifecycleManager, OrchestratorConfig};
use orbit_scheduler::PriorityQueue;
use orbit_state::{ControllerType, DeploymentIntentGroupKey, StateStore};

const DEFAULT_LOG_FILTER: &str = "info,orbitd=debug,orbit_orchestrator=debug,orbit_scheduler=debug";

#[derive(Parser)]
#[command(name = "orbitd", about = "Orbit multi-cluster orchestrator")]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory; overrides `[store] data_dir`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the lifecycle trail of a deployment intent group as JSON.
    Status {
        #[arg(long)]
        project: String,

        #[arg(long)]
        composite_app: String,

        #[arg(long)]
        version: String,

        /// Deployment intent group name.
        #[arg(long)]
        group: String,
    },

    /// Print every node of a deployment context.
    Context {
        #[arg(long)]
        id: String,
    },

    /// List registered controllers, placement first, by priority.
    Controllers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = match &cli.config {
        Some(path) => OrchestratorConfig::from_file(path)?,
        None => OrchestratorConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.store.data_dir = data_dir;
    }
    debug!(?config, "configuration loaded");

    std::fs::create_dir_all(&config.store.data_dir)?;
    let state = StateStore::open(&config.state_path())?;
    let contexts = ContextStore::open(&config.context_path())?;
    info!(data_dir = ?config.store.data_dir, "stores opened");

    match cli.command {
        Command::Status {
            project,
            composite_app,
            version,
            group,
        } => {
            let key = DeploymentIntentGroupKey::new(&project, &composite_app, &version, &group);
            let report = LifecycleManager::new(state, contexts).status(&key)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Context { id } => {
            let context = contexts.load(&id)?;
            for (handle, value) in context.dump()? {
                println!("{handle}\t{value}");
            }
        }
        Command::Controllers => {
            let mut placement = PriorityQueue::new();
            let mut action = PriorityQueue::new();
            let mut other = Vec::new();
            for controller in state.list_controllers()? {
                match controller.spec.kind {
                    ControllerType::Placement => placement.push(controller.spec.priority, controller),
                    ControllerType::Action => action.push(controller.spec.priority, controller),
                    ControllerType::Other => other.push(controller),
                }
            }
            let ordered = [
                ("placement", placement.into_ordered()),
                ("action", action.into_ordered()),
                ("other", other),
            ];
            for (kind, controllers) in ordered {
                for controller in controllers {
                    println!(
                        "{kind:<10} {:>5}  {:<20} {}",
                        controller.spec.priority,
                        controller.name(),
                        controller.endpoint()
                    );
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
