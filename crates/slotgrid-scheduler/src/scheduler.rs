//! Scheduler — runs one pool operation per call against the remote store.
//!
//! Each public operation:
//! - Validates its inputs before any I/O
//! - Fetches the pool state (missing → empty)
//! - Applies exactly one allocator operation
//! - Writes the whole state back, only when something changed
//!
//! Errors are never caught here; they abort the operation and surface to
//! the caller with no partial write.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use slotgrid_pool::{Allocation, Cleanup, PoolError, PoolState, check_capacity};
use slotgrid_store::{PoolRepository, variable_name};

use crate::error::{SchedulerError, SchedulerResult};

/// Branch deployed to the production environment in fixed mode.
pub const PRODUCTION_BRANCH: &str = "main";

/// Environment name used for [`PRODUCTION_BRANCH`].
pub const PRODUCTION_ENVIRONMENT: &str = "production";

/// Environment for a branch when no pool is configured.
pub fn fixed_environment(branch: &str) -> &str {
    if branch == PRODUCTION_BRANCH {
        PRODUCTION_ENVIRONMENT
    } else {
        branch
    }
}

/// Source-control event that triggered a deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployEvent {
    /// A push to the branch: allocate or renew its slot.
    #[default]
    Push,
    /// The branch was deleted: release its slot.
    Delete,
}

/// Result of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Release {
    Released { slot: u32 },
    NothingToRelease,
}

/// Result of a deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Allocated(Allocation),
    Released(Release),
}

/// Sequences fetch → allocator → store for one pool at a time.
#[derive(Clone)]
pub struct SlotScheduler {
    repository: PoolRepository,
}

impl SlotScheduler {
    pub fn new(repository: PoolRepository) -> Self {
        Self { repository }
    }

    /// Allocate (or renew) a slot in `pool` for `branch`.
    pub async fn allocate(
        &self,
        pool: &str,
        capacity: u32,
        branch: &str,
    ) -> SchedulerResult<Allocation> {
        self.allocate_at(pool, capacity, branch, Utc::now()).await
    }

    /// [`Self::allocate`] with an explicit clock reading.
    pub async fn allocate_at(
        &self,
        pool: &str,
        capacity: u32,
        branch: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Allocation> {
        if capacity == 0 {
            return Err(PoolError::CapacityExhausted.into());
        }
        check_capacity(capacity)?;
        validate_branch(branch)?;
        let key = variable_name(pool)?;

        let mut state = self.repository.fetch(&key, capacity).await?;
        let allocation = slotgrid_pool::allocate(&mut state, branch, pool, now)?;
        self.repository.store(&key, &state).await?;

        if let Some(preempted) = &allocation.preempted_branch {
            warn!(
                %pool,
                slot = allocation.slot,
                %preempted,
                "pool full, preempted least recently used branch"
            );
        }
        if allocation.is_new {
            info!(%pool, %branch, slot = allocation.slot, "allocated new slot");
        } else {
            info!(%pool, %branch, slot = allocation.slot, "reusing slot");
        }
        Ok(allocation)
    }

    /// Release the slot held by `branch`. The store is written only when a
    /// slot was actually freed.
    pub async fn release(
        &self,
        pool: &str,
        capacity: u32,
        branch: &str,
    ) -> SchedulerResult<Release> {
        check_capacity(capacity)?;
        let key = variable_name(pool)?;
        let mut state = self.repository.fetch(&key, capacity).await?;

        match slotgrid_pool::release(&mut state, branch) {
            Some(slot) => {
                self.repository.store(&key, &state).await?;
                info!(%pool, %branch, slot, "released slot");
                Ok(Release::Released { slot })
            }
            None => {
                info!(%pool, %branch, "no slot found for branch");
                Ok(Release::NothingToRelease)
            }
        }
    }

    /// Release every slot idle for more than `max_age_days`.
    pub async fn cleanup(
        &self,
        pool: &str,
        capacity: u32,
        max_age_days: u32,
    ) -> SchedulerResult<Cleanup> {
        self.cleanup_at(pool, capacity, max_age_days, Utc::now()).await
    }

    /// [`Self::cleanup`] with an explicit clock reading.
    pub async fn cleanup_at(
        &self,
        pool: &str,
        capacity: u32,
        max_age_days: u32,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Cleanup> {
        check_capacity(capacity)?;
        let key = variable_name(pool)?;
        let mut state = self.repository.fetch(&key, capacity).await?;

        let cleanup = slotgrid_pool::cleanup(&mut state, max_age_days, now);
        if cleanup.is_empty() {
            info!(%pool, max_age_days, "no slots to clean up");
            return Ok(cleanup);
        }

        self.repository.store(&key, &state).await?;
        info!(
            %pool,
            count = cleanup.released_slots.len(),
            branches = %cleanup.released_branches.join(", "),
            "cleaned up slots"
        );
        Ok(cleanup)
    }

    /// Current pool table, read-only.
    pub async fn status(&self, pool: &str, capacity: u32) -> SchedulerResult<PoolState> {
        check_capacity(capacity)?;
        let key = variable_name(pool)?;
        Ok(self.repository.fetch(&key, capacity).await?)
    }

    /// Dispatch a source-control event to allocate or release.
    pub async fn deploy(
        &self,
        pool: &str,
        capacity: u32,
        branch: &str,
        event: DeployEvent,
    ) -> SchedulerResult<DeployOutcome> {
        match event {
            DeployEvent::Push => self
                .allocate(pool, capacity, branch)
                .await
                .map(DeployOutcome::Allocated),
            DeployEvent::Delete => self
                .release(pool, capacity, branch)
                .await
                .map(DeployOutcome::Released),
        }
    }
}

fn validate_branch(branch: &str) -> SchedulerResult<()> {
    if branch.is_empty() {
        return Err(SchedulerError::EmptyBranch);
    }
    Ok(())
}
