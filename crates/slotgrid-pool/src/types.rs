//! Domain types for a slot pool.
//!
//! A `PoolState` is the whole allocation table for one named pool. Slots
//! are addressed 1-based and always form the contiguous range
//! `1..=capacity`. The stored JSON form keys slots by their decimal index:
//!
//! ```text
//! {"max_slots":2,"slots":{"1":{"branch":"feature/a","updated":"2024-01-15T10:00:00Z"},"2":null}}
//! ```

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PoolError, PoolResult};

/// The branch currently holding a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOccupant {
    pub branch: String,
    /// Time of assignment or most recent renewal.
    pub updated: DateTime<Utc>,
}

impl SlotOccupant {
    pub fn new(branch: &str, updated: DateTime<Utc>) -> Self {
        Self {
            branch: branch.to_string(),
            updated,
        }
    }
}

/// Outcome of a successful allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub slot: u32,
    /// `{pool}-{slot}`.
    pub environment: String,
    /// False when the branch already held this slot.
    pub is_new: bool,
    /// Branch evicted to make room, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preempted_branch: Option<String>,
}

/// Largest number of slots a pool may hold.
pub const MAX_CAPACITY: u32 = 1024;

/// Reject capacities above [`MAX_CAPACITY`].
pub fn check_capacity(capacity: u32) -> PoolResult<()> {
    if capacity > MAX_CAPACITY {
        return Err(PoolError::CapacityTooLarge {
            requested: capacity,
            max: MAX_CAPACITY,
        });
    }
    Ok(())
}

/// Derive the environment name exposed for a pool slot.
pub fn environment_name(pool_name: &str, slot: u32) -> String {
    format!("{pool_name}-{slot}")
}

/// Fixed-capacity allocation table for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PoolRecord", into = "PoolRecord")]
pub struct PoolState {
    /// Index 0 holds slot 1.
    slots: Vec<Option<SlotOccupant>>,
}

impl PoolState {
    /// Synthesize a pool with `capacity` unoccupied slots.
    pub fn empty(capacity: u32) -> Self {
        Self {
            slots: vec![None; capacity as usize],
        }
    }

    /// Decode a stored value for a pool configured with `capacity` slots.
    ///
    /// Malformed or structurally invalid input yields an empty pool sized to
    /// `capacity`, discarding whatever the payload held. A stored pool
    /// smaller than `capacity` is expanded; a larger one is rejected, as is
    /// a `capacity` above [`MAX_CAPACITY`].
    pub fn parse(value: &str, capacity: u32) -> PoolResult<Self> {
        check_capacity(capacity)?;
        match serde_json::from_str::<PoolState>(value) {
            Ok(state) if state.capacity() == capacity => Ok(state),
            Ok(state) => {
                debug!(
                    stored = state.capacity(),
                    configured = capacity,
                    "stored pool capacity differs from configuration"
                );
                state.expand(capacity)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    capacity,
                    "stored pool state is malformed, existing allocations are discarded"
                );
                Ok(Self::empty(capacity))
            }
        }
    }

    /// Encode into the canonical stored form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Total number of slots.
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Grow the pool to `new_capacity` slots, keeping every assignment.
    pub fn expand(mut self, new_capacity: u32) -> PoolResult<Self> {
        let current = self.capacity();
        if new_capacity < current {
            return Err(PoolError::InvalidCapacityShrink {
                current,
                requested: new_capacity,
            });
        }
        check_capacity(new_capacity)?;
        self.slots.resize(new_capacity as usize, None);
        Ok(self)
    }

    /// Occupant of `slot`, or `None` if the slot is free or out of range.
    pub fn occupant(&self, slot: u32) -> Option<&SlotOccupant> {
        slot.checked_sub(1)
            .and_then(|i| self.slots.get(i as usize))
            .and_then(Option::as_ref)
    }

    /// All slots in ascending index order.
    pub fn slots(&self) -> impl Iterator<Item = (u32, Option<&SlotOccupant>)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, occupant)| (i as u32 + 1, occupant.as_ref()))
    }

    /// Occupied slots in ascending index order.
    pub fn occupied(&self) -> impl Iterator<Item = (u32, &SlotOccupant)> {
        self.slots()
            .filter_map(|(slot, occupant)| occupant.map(|o| (slot, o)))
    }

    /// Slot currently held by `branch`.
    pub fn find_slot_by_branch(&self, branch: &str) -> Option<u32> {
        self.occupied()
            .find(|(_, o)| o.branch == branch)
            .map(|(slot, _)| slot)
    }

    /// Lowest-indexed unoccupied slot.
    pub fn find_free_slot(&self) -> Option<u32> {
        self.slots()
            .find(|(_, occupant)| occupant.is_none())
            .map(|(slot, _)| slot)
    }

    /// Occupied slot with the earliest `updated`; ties go to the lowest index.
    pub fn find_oldest_slot(&self) -> Option<u32> {
        let mut oldest: Option<(u32, DateTime<Utc>)> = None;
        for (slot, occupant) in self.occupied() {
            match oldest {
                Some((_, at)) if occupant.updated >= at => {}
                _ => oldest = Some((slot, occupant.updated)),
            }
        }
        oldest.map(|(slot, _)| slot)
    }

    /// Place `occupant` in `slot`, returning the previous occupant.
    pub(crate) fn assign(&mut self, slot: u32, occupant: SlotOccupant) -> Option<SlotOccupant> {
        self.slots[slot as usize - 1].replace(occupant)
    }

    /// Free `slot`, returning its previous occupant.
    pub(crate) fn clear(&mut self, slot: u32) -> Option<SlotOccupant> {
        self.slots[slot as usize - 1].take()
    }

    pub(crate) fn occupant_mut(&mut self, slot: u32) -> Option<&mut SlotOccupant> {
        self.slots[slot as usize - 1].as_mut()
    }
}

// ── Stored form ────────────────────────────────────────────────────

/// JSON shape of a stored pool: slot indices become decimal-string keys.
#[derive(Serialize, Deserialize)]
struct PoolRecord {
    max_slots: u32,
    slots: BTreeMap<u32, Option<SlotOccupant>>,
}

impl From<PoolState> for PoolRecord {
    fn from(state: PoolState) -> Self {
        Self {
            max_slots: state.capacity(),
            slots: (1..).zip(state.slots).collect(),
        }
    }
}

impl TryFrom<PoolRecord> for PoolState {
    type Error = String;

    fn try_from(record: PoolRecord) -> Result<Self, Self::Error> {
        let expected = 1..=record.max_slots;
        if record.slots.len() != record.max_slots as usize
            || record.slots.keys().any(|slot| !expected.contains(slot))
        {
            return Err(format!(
                "slot keys do not match 1..={} ({} entries)",
                record.max_slots,
                record.slots.len()
            ));
        }

        let mut seen = HashSet::new();
        for occupant in record.slots.values().flatten() {
            if occupant.branch.is_empty() {
                return Err("slot occupant has an empty branch".to_string());
            }
            if !seen.insert(occupant.branch.as_str()) {
                return Err(format!("branch {} occupies more than one slot", occupant.branch));
            }
        }

        Ok(Self {
            slots: record.slots.into_values().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: &str) -> DateTime<Utc> {
        ts.parse().unwrap()
    }

    fn pool(entries: &[Option<(&str, &str)>]) -> PoolState {
        let mut state = PoolState::empty(entries.len() as u32);
        for (i, entry) in entries.iter().enumerate() {
            if let Some((branch, ts)) = entry {
                state.assign(i as u32 + 1, SlotOccupant::new(branch, at(ts)));
            }
        }
        state
    }

    #[test]
    fn empty_pool_has_all_slots_free() {
        for capacity in [1, 3, 17] {
            let state = PoolState::empty(capacity);
            assert_eq!(state.capacity(), capacity);
            assert_eq!(state.slots().count(), capacity as usize);
            assert_eq!(state.occupied().count(), 0);
        }
    }

    #[test]
    fn parse_valid_json() {
        let json = r#"{"max_slots":2,"slots":{"1":{"branch":"feature/a","updated":"2024-01-01T00:00:00Z"},"2":null}}"#;
        let state = PoolState::parse(json, 2).unwrap();

        assert_eq!(state.capacity(), 2);
        assert_eq!(state.occupant(1).unwrap().branch, "feature/a");
        assert!(state.occupant(2).is_none());
    }

    #[test]
    fn parse_invalid_json_yields_empty_pool() {
        let state = PoolState::parse("invalid", 3).unwrap();
        assert_eq!(state, PoolState::empty(3));
    }

    #[test]
    fn parse_ignores_capacity_embedded_in_malformed_payload() {
        // Slot 3 is missing, so the payload is structurally invalid.
        let json = r#"{"max_slots":3,"slots":{"1":null,"2":null}}"#;
        let state = PoolState::parse(json, 5).unwrap();
        assert_eq!(state, PoolState::empty(5));
    }

    #[test]
    fn parse_rejects_structural_violations() {
        let cases = [
            r#"{"max_slots":2,"slots":{"1":null,"2":null,"3":null}}"#,
            r#"{"max_slots":2,"slots":{"0":null,"1":null}}"#,
            r#"{"max_slots":1,"slots":{"1":{"branch":"","updated":"2024-01-01T00:00:00Z"}}}"#,
            r#"{"max_slots":2,"slots":{"1":{"branch":"a","updated":"2024-01-01T00:00:00Z"},"2":{"branch":"a","updated":"2024-01-02T00:00:00Z"}}}"#,
            r#"{"max_slots":1,"slots":{"1":{"branch":"a","updated":"yesterday"}}}"#,
            r#"{"slots":{}}"#,
        ];
        for json in cases {
            assert_eq!(PoolState::parse(json, 2).unwrap(), PoolState::empty(2), "{json}");
        }
    }

    #[test]
    fn parse_expands_when_capacity_increased() {
        let json = r#"{"max_slots":2,"slots":{"1":{"branch":"a","updated":"2024-01-01T00:00:00Z"},"2":null}}"#;
        let state = PoolState::parse(json, 5).unwrap();

        assert_eq!(state.capacity(), 5);
        assert_eq!(state.occupant(1).unwrap().branch, "a");
        assert_eq!(state.occupied().count(), 1);
    }

    #[test]
    fn parse_rejects_capacity_shrink() {
        let json = r#"{"max_slots":3,"slots":{"1":null,"2":null,"3":null}}"#;
        let err = PoolState::parse(json, 2).unwrap_err();
        assert_eq!(
            err,
            PoolError::InvalidCapacityShrink {
                current: 3,
                requested: 2
            }
        );
    }

    #[test]
    fn expand_preserves_occupants() {
        let state = pool(&[Some(("a", "2024-01-01T00:00:00Z")), None]);
        let expanded = state.clone().expand(4).unwrap();

        assert_eq!(expanded.capacity(), 4);
        assert_eq!(expanded.occupant(1), state.occupant(1));
        assert!(expanded.occupant(3).is_none());
        assert!(expanded.occupant(4).is_none());
    }

    #[test]
    fn expand_to_same_capacity_is_identity() {
        let state = pool(&[Some(("a", "2024-01-01T00:00:00Z"))]);
        assert_eq!(state.clone().expand(1).unwrap(), state);
    }

    #[test]
    fn expand_rejects_capacity_above_maximum() {
        let err = PoolState::empty(2).expand(u32::MAX).unwrap_err();
        assert_eq!(
            err,
            PoolError::CapacityTooLarge {
                requested: u32::MAX,
                max: MAX_CAPACITY
            }
        );
        assert_eq!(PoolState::empty(2).expand(MAX_CAPACITY).unwrap().capacity(), MAX_CAPACITY);
    }

    #[test]
    fn parse_rejects_capacity_above_maximum() {
        for json in [r#"{"max_slots":1,"slots":{"1":null}}"#, "not json"] {
            let err = PoolState::parse(json, MAX_CAPACITY + 1).unwrap_err();
            assert!(matches!(err, PoolError::CapacityTooLarge { .. }));
        }
    }

    #[test]
    fn expand_rejects_shrink_even_when_empty() {
        let err = PoolState::empty(4).expand(1).unwrap_err();
        assert!(matches!(err, PoolError::InvalidCapacityShrink { current: 4, requested: 1 }));
    }

    #[test]
    fn json_uses_decimal_string_keys() {
        let state = pool(&[None, Some(("feature/x", "2024-01-01T00:00:00Z"))]);
        let value: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();

        assert_eq!(value["max_slots"], 2);
        assert!(value["slots"]["1"].is_null());
        assert_eq!(value["slots"]["2"]["branch"], "feature/x");
        assert_eq!(value["slots"]["2"]["updated"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn json_round_trip() {
        let state = pool(&[
            Some(("a", "2024-01-03T00:00:00Z")),
            None,
            Some(("b", "2024-01-01T12:30:00.250Z")),
        ]);
        let decoded = PoolState::parse(&state.to_json().unwrap(), 3).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn find_slot_by_branch() {
        let state = pool(&[None, Some(("feature/x", "2024-01-01T00:00:00Z")), None]);
        assert_eq!(state.find_slot_by_branch("feature/x"), Some(2));
        assert_eq!(state.find_slot_by_branch("feature/y"), None);
    }

    #[test]
    fn find_free_slot() {
        let state = pool(&[Some(("a", "2024-01-01T00:00:00Z")), None, None]);
        assert_eq!(state.find_free_slot(), Some(2));

        let full = pool(&[
            Some(("a", "2024-01-01T00:00:00Z")),
            Some(("b", "2024-01-01T00:00:00Z")),
        ]);
        assert_eq!(full.find_free_slot(), None);
    }

    #[test]
    fn find_oldest_slot() {
        let state = pool(&[
            Some(("a", "2024-01-03T00:00:00Z")),
            Some(("b", "2024-01-01T00:00:00Z")),
            Some(("c", "2024-01-02T00:00:00Z")),
        ]);
        assert_eq!(state.find_oldest_slot(), Some(2));
        assert_eq!(PoolState::empty(3).find_oldest_slot(), None);
    }

    #[test]
    fn find_oldest_slot_tie_goes_to_lowest_index() {
        let state = pool(&[
            Some(("a", "2024-01-05T00:00:00Z")),
            Some(("b", "2024-01-01T00:00:00Z")),
            Some(("c", "2024-01-01T00:00:00Z")),
        ]);
        assert_eq!(state.find_oldest_slot(), Some(2));
    }

    #[test]
    fn occupant_out_of_range() {
        let state = PoolState::empty(2);
        assert!(state.occupant(0).is_none());
        assert!(state.occupant(3).is_none());
    }

    #[test]
    fn environment_name_format() {
        assert_eq!(environment_name("bugfix", 2), "bugfix-2");
    }
}
