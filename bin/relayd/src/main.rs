//! Relay registry daemon binary.

mod cli;
mod config;
mod logging;
mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Result, bail};
use relay_registry::{FileNodeStore, RelayRegistry, spawn_persistence};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands, ConfigArgs, InspectArgs, RegisterArgs, RunArgs};
use crate::config::RelaydConfig;
use crate::status::StatusConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_args)?;

    match cli.command {
        Commands::Run(args) => run(&cli.config, args).await,
        Commands::Stats(args) => {
            let registry = open_snapshot(&cli.config, &args)?;
            print_json(&registry.recompute_stats())
        }
        Commands::Leaderboard(args) => {
            let registry = open_snapshot(&cli.config, &args.inspect)?;
            print_json(&registry.leaderboard(args.limit))
        }
        Commands::Select(args) => {
            let registry = open_snapshot(&cli.config, &args.inspect)?;
            print_json(&registry.select_summaries(&args.query()))
        }
        Commands::Register(args) => register(&cli.config, &args),
        Commands::Config(args) => config_command(&cli.config, &args),
    }
}

/// Run the registry until interrupted, flushing state on the way out.
async fn run(config_path: &Path, args: RunArgs) -> Result<()> {
    let mut config = RelaydConfig::load_or_create(config_path)?;
    config.apply_cli_args(&args);

    let geo = config.geo_lookup();
    info!(
        config = %config_path.display(),
        geo_entries = geo.len(),
        "starting relay registry"
    );

    let registry = Arc::new(RelayRegistry::new(config.registry.clone(), Arc::new(geo)));
    let store = Arc::new(FileNodeStore::new_with_create_dir(
        &config.persistence.nodes_file,
    )?);
    let loaded = registry.load_from_store(store.as_ref())?;
    info!(
        loaded,
        path = %config.persistence.nodes_file.display(),
        "loaded node set"
    );

    let persistence = spawn_persistence(
        Arc::clone(&registry),
        Arc::clone(&store),
        config.persistence.config(),
    );

    let (status_tx, status_rx) = oneshot::channel();
    let status = status::spawn_status_task(
        Arc::clone(&registry),
        StatusConfig {
            interval: Duration::from_secs(config.status.interval_secs.max(1)),
            stale_after: (config.status.stale_after_secs > 0)
                .then(|| Duration::from_secs(config.status.stale_after_secs)),
        },
        status_rx,
    );

    let mut events = registry.subscribe();
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => debug!(?event, "registry event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    info!("shutting down");
    let _ = status_tx.send(());
    status.await?;
    persistence.shutdown().await;
    info!(nodes = registry.node_count(), "registry stopped");

    Ok(())
}

/// Load a persisted node file into a throwaway registry for inspection.
fn open_snapshot(config_path: &Path, args: &InspectArgs) -> Result<RelayRegistry> {
    let config = RelaydConfig::load_or_default(config_path)?;
    let path: PathBuf = args
        .nodes_file
        .clone()
        .unwrap_or_else(|| config.persistence.nodes_file.clone());

    if !path.exists() {
        bail!("node file {} does not exist", path.display());
    }

    let store = FileNodeStore::new(&path)?;
    let registry = RelayRegistry::new(config.registry.clone(), Arc::new(config.geo_lookup()));
    let loaded = registry.load_from_store(&store)?;
    debug!(loaded, path = %path.display(), "opened node file");

    Ok(registry)
}

/// Register one node into the node file, creating it if needed.
fn register(config_path: &Path, args: &RegisterArgs) -> Result<()> {
    let config = RelaydConfig::load_or_default(config_path)?;
    let path = args
        .inspect
        .nodes_file
        .clone()
        .unwrap_or_else(|| config.persistence.nodes_file.clone());

    let store = FileNodeStore::new_with_create_dir(&path)?;
    let registry = RelayRegistry::new(config.registry.clone(), Arc::new(config.geo_lookup()));
    registry.load_from_store(&store)?;

    let node = registry.register(args.descriptor());
    let saved = registry.save_to_store(&store)?;
    info!(id = %node.id, nodes = saved, path = %path.display(), "node registered");

    print_json(&node.receipt())
}

fn config_command(config_path: &Path, args: &ConfigArgs) -> Result<()> {
    if args.init {
        let existed = config_path.exists();
        RelaydConfig::load_or_create(config_path)?;
        if existed {
            println!("{} already exists", config_path.display());
        } else {
            println!("wrote default configuration to {}", config_path.display());
        }
    }

    if args.show || !args.init {
        let config = RelaydConfig::load_or_default(config_path)?;
        print!("{}", toml::to_string_pretty(&config)?);
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
