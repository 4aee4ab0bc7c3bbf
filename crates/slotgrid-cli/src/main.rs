//! slotctl — allocate preview-environment slots to branches.
//!
//! # Usage
//!
//! ```text
//! slotctl --config slotgrid.toml deploy --branch feature/login
//! slotctl allocate --pool preview --capacity 4 --branch feature/login
//! slotctl cleanup --pool preview --capacity 4 --days 7
//! ```
//!
//! Results go to stdout as `key=value` lines (or JSON with `--format json`);
//! logs go to stderr.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

mod commands;
mod config;

use commands::OutputFormat;

#[derive(Parser)]
#[command(
    name = "slotctl",
    about = "SlotGrid — branch slot allocator for preview environments",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to slotgrid.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the redb state file from the config
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Output format: text or json
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct PoolArgs {
    /// Pool name (defaults to [pool].name)
    #[arg(long)]
    pool: Option<String>,
    /// Number of slots in the pool (defaults to [pool].capacity)
    #[arg(long)]
    capacity: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Event {
    Push,
    Delete,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a push or branch-delete event.
    ///
    /// With a pool configured, a push allocates a slot and a delete
    /// releases it. Without one, the branch deploys to a fixed
    /// environment: main → production, anything else → the branch name.
    Deploy {
        #[command(flatten)]
        pool: PoolArgs,
        /// Branch that triggered the event
        #[arg(short, long)]
        branch: String,
        #[arg(short, long, value_enum, default_value = "push")]
        event: Event,
    },
    /// Allocate or renew a slot for a branch
    Allocate {
        #[command(flatten)]
        pool: PoolArgs,
        #[arg(short, long)]
        branch: String,
    },
    /// Release the slot held by a branch
    Release {
        #[command(flatten)]
        pool: PoolArgs,
        #[arg(short, long)]
        branch: String,
    },
    /// Release slots idle for longer than the given number of days
    Cleanup {
        #[command(flatten)]
        pool: PoolArgs,
        /// Maximum idle age in days (defaults to [pool].cleanup_days, then 7)
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Show the current slot table
    Status {
        #[command(flatten)]
        pool: PoolArgs,
    },
    /// Write a slotgrid.toml scaffold
    Init {
        #[arg(short, long, default_value = "slotgrid.toml")]
        path: PathBuf,
        #[arg(long, default_value = "preview")]
        pool: String,
        #[arg(long, default_value = "4")]
        capacity: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Init { path, pool, capacity } = &cli.command {
        return commands::init(path, pool, *capacity);
    }

    let config = config::SlotgridConfig::load(cli.config.as_deref())?;
    let ctx = commands::Context::new(config, cli.store, cli.format);

    match cli.command {
        Commands::Deploy { pool, branch, event } => {
            let event = match event {
                Event::Push => slotgrid_scheduler::DeployEvent::Push,
                Event::Delete => slotgrid_scheduler::DeployEvent::Delete,
            };
            commands::deploy(&ctx, pool.pool, pool.capacity, &branch, event).await
        }
        Commands::Allocate { pool, branch } => {
            let (name, capacity) = ctx.resolve_pool(pool.pool, pool.capacity)?;
            commands::allocate(&ctx, &name, capacity, &branch).await
        }
        Commands::Release { pool, branch } => {
            let (name, capacity) = ctx.resolve_pool(pool.pool, pool.capacity)?;
            commands::release(&ctx, &name, capacity, &branch).await
        }
        Commands::Cleanup { pool, days } => {
            let (name, capacity) = ctx.resolve_pool(pool.pool, pool.capacity)?;
            let days = days.unwrap_or_else(|| ctx.config.cleanup_days());
            commands::cleanup(&ctx, &name, capacity, days).await
        }
        Commands::Status { pool } => {
            let (name, capacity) = ctx.resolve_pool(pool.pool, pool.capacity)?;
            commands::status(&ctx, &name, capacity).await
        }
        Commands::Init { .. } => Ok(()),
    }
}
