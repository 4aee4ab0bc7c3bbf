//! Slot allocator — decides which slot a branch gets.
//!
//! Allocation follows a three-tier policy, evaluated in order:
//! 1. Reuse the slot the branch already holds (renewing its timestamp)
//! 2. Take the lowest-indexed free slot
//! 3. Preempt the least-recently-updated occupant (lowest index on ties)
//!
//! All functions mutate a `PoolState` in place and never perform I/O.

use chrono::{DateTime, Days, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{PoolError, PoolResult};
use crate::types::{Allocation, PoolState, SlotOccupant, environment_name};

/// Slots freed by a cleanup pass, positionally paired and in ascending slot order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cleanup {
    pub released_slots: Vec<u32>,
    pub released_branches: Vec<String>,
}

impl Cleanup {
    pub fn is_empty(&self) -> bool {
        self.released_slots.is_empty()
    }
}

/// Assign a slot in `state` to `branch`.
///
/// Fails only when the pool has no slots at all.
pub fn allocate(
    state: &mut PoolState,
    branch: &str,
    pool_name: &str,
    now: DateTime<Utc>,
) -> PoolResult<Allocation> {
    if state.capacity() == 0 {
        return Err(PoolError::CapacityExhausted);
    }

    if let Some(slot) = state.find_slot_by_branch(branch) {
        if let Some(occupant) = state.occupant_mut(slot) {
            occupant.updated = now;
        }
        debug!(%branch, slot, "renewed existing slot");
        return Ok(Allocation {
            slot,
            environment: environment_name(pool_name, slot),
            is_new: false,
            preempted_branch: None,
        });
    }

    if let Some(slot) = state.find_free_slot() {
        state.assign(slot, SlotOccupant::new(branch, now));
        debug!(%branch, slot, pool = pool_name, "assigned free slot");
        return Ok(Allocation {
            slot,
            environment: environment_name(pool_name, slot),
            is_new: true,
            preempted_branch: None,
        });
    }

    // Pool is full and non-empty, so an oldest slot always exists.
    let Some(slot) = state.find_oldest_slot() else {
        return Err(PoolError::CapacityExhausted);
    };
    let evicted = state.assign(slot, SlotOccupant::new(branch, now));
    let preempted_branch = evicted.map(|o| o.branch);
    debug!(
        %branch,
        slot,
        pool = pool_name,
        preempted = preempted_branch.as_deref().unwrap_or_default(),
        "pool full, preempted least recently used slot"
    );

    Ok(Allocation {
        slot,
        environment: environment_name(pool_name, slot),
        is_new: true,
        preempted_branch,
    })
}

/// Free the slot held by `branch`. Returns the slot, or `None` if the
/// branch holds nothing.
pub fn release(state: &mut PoolState, branch: &str) -> Option<u32> {
    let slot = state.find_slot_by_branch(branch)?;
    state.clear(slot);
    debug!(%branch, slot, "released slot");
    Some(slot)
}

/// Free every slot whose occupant was last updated strictly before
/// `now - max_age_days` calendar days.
pub fn cleanup(state: &mut PoolState, max_age_days: u32, now: DateTime<Utc>) -> Cleanup {
    let cutoff = now
        .checked_sub_days(Days::new(u64::from(max_age_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let stale: Vec<u32> = state
        .occupied()
        .filter(|(_, occupant)| occupant.updated < cutoff)
        .map(|(slot, _)| slot)
        .collect();

    let mut result = Cleanup::default();
    for slot in stale {
        if let Some(occupant) = state.clear(slot) {
            result.released_slots.push(slot);
            result.released_branches.push(occupant.branch);
        }
    }

    if !result.is_empty() {
        debug!(
            released = result.released_slots.len(),
            %cutoff,
            "cleaned up stale slots"
        );
    }
    result
}
