//! cldctl command line interface
//!
//! Thin surface over the engine crates: load component and datacenter
//! specs, build the graph, plan, and execute. Plugin implementations and
//! artifact resolution are wired in by the embedding distribution; this
//! binary only carries the orchestration pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "cldctl")]
#[command(about = "Deployment orchestrator: declarative components onto datacenter-defined infrastructure")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// State directory (defaults to ~/.cldctl/state)
    #[arg(long, global = true, value_name = "PATH")]
    state_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and print the plan without executing it
    Plan(commands::PlanArgs),

    /// Plan and execute a deployment
    Deploy(commands::DeployArgs),

    /// Plan and execute a destroy
    Destroy(commands::DestroyArgs),

    /// Inspect persisted state
    State(commands::StateArgs),

    /// Print the resource graph in execution order
    Graph(commands::GraphArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let state_dir = match cli.state_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
            .context("could not determine home directory; pass --state-dir")?
            .join(".cldctl")
            .join("state"),
    };

    smol::block_on(async move {
        match cli.command {
            Commands::Plan(args) => commands::plan(args, &state_dir).await,
            Commands::Deploy(args) => commands::deploy(args, &state_dir).await,
            Commands::Destroy(args) => commands::destroy(args, &state_dir).await,
            Commands::State(args) => commands::state(args, &state_dir).await,
            Commands::Graph(args) => commands::graph(args).await,
        }
    })
}
