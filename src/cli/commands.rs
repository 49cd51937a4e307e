use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::agent::{AgentProfile, AgentService};
use crate::config::{AgentConfig, ControllerConfig};
use crate::history::HistoryStore;
use crate::metrics::ControllerMetrics;
use crate::monitor::Monitor;
use crate::runtime_config::RuntimeConfig;
use crate::server::{ControllerService, HttpServer};
use crate::state::ControllerState;

#[derive(Parser)]
#[command(name = "loadmesh")]
#[command(about = "Mesh load balancer CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the mesh controller: monitor loop, operator API, optional proxy
    Controller {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long, default_value = "0.0.0.0:5000")]
        addr: String,

        /// Forward non-API traffic to the best node per request
        #[arg(long, default_value_t = false)]
        proxy: bool,
    },
    /// Run the node agent: capacity benchmark plus the stats endpoint
    Agent {
        #[arg(short, long)]
        config: PathBuf,

        /// Override the listen address derived from the profile port
        #[arg(long)]
        addr: Option<String>,
    },
}

pub fn run_cli() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
    may::config().set_stack_size(RuntimeConfig::from_env().stack_size);

    let cli = Cli::parse();
    match cli.command {
        Commands::Controller {
            config,
            addr,
            proxy,
        } => run_controller(&config, &addr, proxy),
        Commands::Agent { config, addr } => run_agent(&config, addr),
    }
}

fn run_controller(config_path: &Path, addr: &str, proxy: bool) -> anyhow::Result<()> {
    let config = ControllerConfig::load(config_path)?;

    let state = Arc::new(ControllerState::new(
        config.nodes.clone(),
        config.panic_url.clone(),
    ));
    let history = Arc::new(HistoryStore::new(&config.history_db));
    if let Err(error) = history.init() {
        // Not fatal: samples are skipped per tick until the store recovers.
        warn!(error = %error, "history store init failed");
    }
    let metrics = Arc::new(ControllerMetrics::new());

    let _monitor = Monitor::new(
        Arc::clone(&state),
        Arc::clone(&history),
        Arc::clone(&metrics),
        &config,
    )
    .spawn();

    let service = ControllerService::new(state, history, metrics, proxy);
    println!(
        "mesh controller listening on {addr} (proxy {})",
        if proxy { "on" } else { "off" }
    );
    let handle = HttpServer(service)
        .start(addr)
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;
    handle
        .join()
        .map_err(|e| anyhow::anyhow!("controller server crashed: {e:?}"))?;
    Ok(())
}

fn run_agent(config_path: &Path, addr: Option<String>) -> anyhow::Result<()> {
    let config = AgentConfig::load(config_path)?;
    let profile = AgentProfile::load_or_generate(&config)?;

    let addr = addr.unwrap_or_else(|| format!("0.0.0.0:{}", profile.port));
    let service = AgentService::new(profile, config.watts);
    println!(
        "node agent {} listening on {addr}",
        service.profile().server_name
    );
    let handle = HttpServer(service)
        .start(&addr)
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;
    handle
        .join()
        .map_err(|e| anyhow::anyhow!("agent server crashed: {e:?}"))?;
    Ok(())
}
