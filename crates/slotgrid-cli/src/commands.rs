//! Subcommand handlers for slotctl.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, bail};
use clap::ValueEnum;
use serde_json::json;
use tracing::{debug, info};

use slotgrid_pool::{Allocation, Cleanup, PoolState};
use slotgrid_scheduler::{DeployEvent, DeployOutcome, Release, SlotScheduler, fixed_environment};
use slotgrid_store::{PoolRepository, RedbVariableStore};

use crate::config::SlotgridConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Resolved configuration shared by all handlers.
pub struct Context {
    pub config: SlotgridConfig,
    store_path: PathBuf,
    format: OutputFormat,
}

impl Context {
    pub fn new(config: SlotgridConfig, store_override: Option<PathBuf>, format: OutputFormat) -> Self {
        let store_path = store_override.unwrap_or_else(|| config.store_path());
        Self {
            config,
            store_path,
            format,
        }
    }

    /// Pool name and capacity from flags, falling back to the config file.
    pub fn resolve_pool(
        &self,
        name: Option<String>,
        capacity: Option<u32>,
    ) -> anyhow::Result<(String, u32)> {
        let name = name.or_else(|| self.config.pool_name().map(str::to_string));
        let capacity = capacity.or_else(|| self.config.pool_capacity());
        match (name, capacity) {
            (Some(name), Some(capacity)) => Ok((name, capacity)),
            _ => bail!("pool and capacity are required for pool operations"),
        }
    }

    fn scheduler(&self) -> anyhow::Result<SlotScheduler> {
        if let Some(parent) = self.store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let store = RedbVariableStore::open(&self.store_path)?;
        debug!(path = %self.store_path.display(), "using redb variable store");
        let repository = PoolRepository::with_retry(Arc::new(store), self.config.retry_policy());
        Ok(SlotScheduler::new(repository))
    }
}

pub async fn deploy(
    ctx: &Context,
    pool: Option<String>,
    capacity: Option<u32>,
    branch: &str,
    event: DeployEvent,
) -> anyhow::Result<()> {
    let pool = pool.or_else(|| ctx.config.pool_name().map(str::to_string));
    let Some(pool) = pool else {
        let environment = fixed_environment(branch);
        info!(%environment, "deploying to fixed environment");
        print!("{}", render_fixed(environment, ctx.format));
        return Ok(());
    };

    let (pool, capacity) = ctx.resolve_pool(Some(pool), capacity)?;
    match ctx.scheduler()?.deploy(&pool, capacity, branch, event).await? {
        DeployOutcome::Allocated(allocation) => print!("{}", render_allocation(&allocation, ctx.format)),
        DeployOutcome::Released(release) => print!("{}", render_release(release, ctx.format)),
    }
    Ok(())
}

pub async fn allocate(ctx: &Context, pool: &str, capacity: u32, branch: &str) -> anyhow::Result<()> {
    let allocation = ctx.scheduler()?.allocate(pool, capacity, branch).await?;
    print!("{}", render_allocation(&allocation, ctx.format));
    Ok(())
}

pub async fn release(ctx: &Context, pool: &str, capacity: u32, branch: &str) -> anyhow::Result<()> {
    let release = ctx.scheduler()?.release(pool, capacity, branch).await?;
    print!("{}", render_release(release, ctx.format));
    Ok(())
}

pub async fn cleanup(ctx: &Context, pool: &str, capacity: u32, days: u32) -> anyhow::Result<()> {
    let cleanup = ctx.scheduler()?.cleanup(pool, capacity, days).await?;
    print!("{}", render_cleanup(&cleanup, ctx.format));
    Ok(())
}

pub async fn status(ctx: &Context, pool: &str, capacity: u32) -> anyhow::Result<()> {
    let state = ctx.scheduler()?.status(pool, capacity).await?;
    print!("{}", render_status(&state, ctx.format));
    Ok(())
}

pub fn init(path: &Path, pool: &str, capacity: u32) -> anyhow::Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    slotgrid_pool::check_capacity(capacity)?;
    let config = SlotgridConfig::scaffold(pool, capacity);
    std::fs::write(path, config.to_toml_string()?)?;
    println!("✓ Wrote {}", path.display());
    Ok(())
}

// ── Rendering ──────────────────────────────────────────────────────

fn render_fixed(environment: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("environment={environment}\n"),
        OutputFormat::Json => format!("{}\n", json!({ "environment": environment })),
    }
}

fn render_allocation(allocation: &Allocation, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!(
                "environment={}\nslot={}\nis_new={}\n",
                allocation.environment, allocation.slot, allocation.is_new
            );
            if let Some(preempted) = &allocation.preempted_branch {
                out.push_str(&format!("preempted_branch={preempted}\n"));
            }
            out
        }
        OutputFormat::Json => format!("{}\n", json!(allocation)),
    }
}

fn render_release(release: Release, format: OutputFormat) -> String {
    match (format, release) {
        (OutputFormat::Text, Release::Released { slot }) => format!("released_slot={slot}\n"),
        (OutputFormat::Text, Release::NothingToRelease) => "released_slot=\n".to_string(),
        (OutputFormat::Json, release) => format!("{}\n", json!(release)),
    }
}

fn render_cleanup(cleanup: &Cleanup, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let slots: Vec<String> = cleanup.released_slots.iter().map(u32::to_string).collect();
            format!(
                "released_slots={}\nreleased_branches={}\n",
                slots.join(","),
                cleanup.released_branches.join(",")
            )
        }
        OutputFormat::Json => format!("{}\n", json!(cleanup)),
    }
}

fn render_status(state: &PoolState, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => state
            .slots()
            .map(|(slot, occupant)| match occupant {
                Some(o) => format!("{slot}\t{}\t{}\n", o.branch, o.updated.to_rfc3339()),
                None => format!("{slot}\t-\t-\n"),
            })
            .collect(),
        OutputFormat::Json => {
            let slots: Vec<_> = state
                .slots()
                .map(|(slot, occupant)| json!({ "slot": slot, "occupant": occupant }))
                .collect();
            format!("{}\n", json!({ "capacity": state.capacity(), "slots": slots }))
        }
    }
}
