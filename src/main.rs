//! VM Storage Planner
//!
//! Command-line front end: loads an inventory snapshot and a batch of VM
//! requests, then shortlists hosts or plans (and optionally commits) the
//! batch. Results are printed as JSON on stdout; logs go to stderr.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vm_storage_planner::{FileInventory, PlacementSession, PlannerConfig, VmRequest, VmSpec};

// =============================================================================
// CLI Arguments
// =============================================================================

/// VM Storage Planner - capacity ledger and volume placement for VM batches
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Inventory snapshot file (.json, .yaml or .yml)
    #[arg(long, env = "PLANNER_INVENTORY")]
    inventory: PathBuf,

    /// Planner configuration file (YAML)
    #[arg(long, env = "PLANNER_CONFIG")]
    config: Option<PathBuf>,

    /// Safety buffer in MB, overrides the configuration file
    #[arg(long, env = "PLANNER_BUFFER_SIZE")]
    buffer_size: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List hosts whose aggregate capacity could hold the batch
    Feasible {
        /// VM requests file (list of VM specs, JSON or YAML)
        #[arg(long)]
        requests: PathBuf,

        /// Candidate hosts, comma separated; defaults to every host
        #[arg(long, value_delimiter = ',')]
        hosts: Vec<String>,
    },

    /// Plan the batch on every candidate host
    Plan {
        /// VM requests file (list of VM specs, JSON or YAML)
        #[arg(long)]
        requests: PathBuf,

        /// Candidate hosts, comma separated; defaults to every host
        #[arg(long, value_delimiter = ',')]
        hosts: Vec<String>,

        /// Commit the plan of this host to the ledger
        #[arg(long)]
        commission: Option<String>,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting VM Storage Planner");
    info!("  Version: {}", vm_storage_planner::VERSION);
    info!("  Inventory: {}", args.inventory.display());

    let mut config = match &args.config {
        Some(path) => PlannerConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PlannerConfig::default(),
    };
    if let Some(buffer_size) = args.buffer_size {
        config.buffer_size = buffer_size;
    }
    info!("  Buffer: {} MB", config.buffer_size);

    let mut session = PlacementSession::new(config);
    session
        .refresh(&FileInventory::new(&args.inventory))
        .await
        .with_context(|| format!("loading inventory {}", args.inventory.display()))?;

    let output = match args.command {
        Command::Feasible { requests, hosts } => {
            let vms = load_requests(&requests)?;
            let hosts = candidate_hosts(&session, hosts);
            json!({ "feasible_hosts": session.feasible_hosts(&vms, &hosts) })
        }
        Command::Plan {
            requests,
            hosts,
            commission,
        } => {
            let vms = load_requests(&requests)?;
            let hosts = candidate_hosts(&session, hosts);
            let mut plan = session.plan(&vms, &hosts)?;

            match commission {
                None => serde_json::to_value(&plan)?,
                Some(host) => {
                    let report = serde_json::to_value(&plan)?;
                    let Some(chosen) = plan.take(&host) else {
                        bail!("host {} has no feasible plan for this batch", host);
                    };
                    let consumed = session.commission(&chosen)?;
                    info!("Committed {} VMs to {}", chosen.len(), host);
                    json!({
                        "plan": report,
                        "commissioned": { "host": host, "consumed_mb": consumed },
                    })
                }
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Read a list of VM specs and validate each one
fn load_requests(path: &Path) -> anyhow::Result<Vec<VmRequest>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading requests {}", path.display()))?;

    let specs: Vec<VmSpec> = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
        _ => serde_json::from_str(&raw)?,
    };

    let vms = specs
        .into_iter()
        .map(VmRequest::try_from)
        .collect::<vm_storage_planner::Result<Vec<_>>>()?;
    info!("Loaded {} VM requests from {}", vms.len(), path.display());
    Ok(vms)
}

fn candidate_hosts(session: &PlacementSession, hosts: Vec<String>) -> Vec<String> {
    if hosts.is_empty() {
        session.ledger().hosts().map(|h| h.name.clone()).collect()
    } else {
        hosts
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
