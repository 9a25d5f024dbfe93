//! siphond — the siphon daemon.
//!
//! Assembles the batch engine against a fleet and runs it until Ctrl-C:
//! capacity dispatcher over the node inventory, batch manager on top,
//! controller driving prep mode and then steady-state extraction.
//!
//! The only fleet backend in this build is the deterministic simulator;
//! the engine itself only ever sees the collaborator traits.
//!
//! # Usage
//!
//! ```text
//! siphond init --config siphon.toml
//! siphond run  --config siphon.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::info;

use siphon_batch::{BatchManager, Controller, ControllerSettings};
use siphon_core::SiphonConfig;
use siphon_dispatch::CapacityDispatcher;
use siphon_sim::{SimInventory, SimLauncher, SimOracle, SimWorld};

#[derive(Parser)]
#[command(name = "siphond", about = "siphon batch-extraction daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline against the configured fleet.
    Run {
        /// Path to siphon.toml; omit to use the built-in example setup.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured extraction fraction.
        #[arg(long)]
        fraction: Option<f64>,

        /// Override the configured spacer interval in ms.
        #[arg(long)]
        spacer_ms: Option<f64>,

        /// Override the configured pipeline depth cap.
        #[arg(long)]
        max_depth: Option<u32>,
    },
    /// Write an example siphon.toml.
    Init {
        #[arg(long, default_value = "siphon.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,siphond=debug,siphon=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            fraction,
            spacer_ms,
            max_depth,
        } => {
            let mut config = match config {
                Some(path) => SiphonConfig::from_file(&path)?,
                None => SiphonConfig::example(),
            };
            if let Some(fraction) = fraction {
                config.pipeline.extraction_fraction = fraction;
            }
            if let Some(spacer_ms) = spacer_ms {
                config.pipeline.spacer_ms = spacer_ms;
            }
            if let Some(max_depth) = max_depth {
                config.pipeline.max_depth = max_depth;
            }
            run(config).await
        }
        Command::Init { config } => {
            let example = SiphonConfig::example();
            std::fs::write(&config, example.to_toml_string()?)?;
            info!(path = ?config, "wrote example configuration");
            Ok(())
        }
    }
}

async fn run(config: SiphonConfig) -> anyhow::Result<()> {
    info!(
        target_id = %config.sim.target.name,
        nodes = config.sim.nodes.len(),
        "siphon daemon starting"
    );

    // ── Fleet collaborators ────────────────────────────────────
    let world = Arc::new(SimWorld::new(&config.sim.target));
    let oracle = Arc::new(SimOracle::new(
        Arc::clone(&world),
        config.sim.target.base_duration_ms,
    ));
    let inventory = SimInventory::new(config.sim.nodes.clone());
    let launcher = Arc::new(SimLauncher::new(
        Arc::clone(&world),
        config.sim.time_compression,
    ));

    // ── Engine ─────────────────────────────────────────────────
    let dispatcher = CapacityDispatcher::new(&inventory, launcher)?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let manager = BatchManager::new(dispatcher, events_tx);
    let controller = Controller::new(
        oracle,
        manager,
        events_rx,
        config.sim.target.name.clone(),
        ControllerSettings::from(&config.pipeline),
    );

    // ── Run until Ctrl-C ───────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let controller_handle = tokio::spawn(async move { controller.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    controller_handle.await??;
    info!("siphon daemon stopped");
    Ok(())
}
