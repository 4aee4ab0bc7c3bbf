//! slotgrid-pool — pool state model and slot allocator for SlotGrid.
//!
//! A pool is a fixed-capacity table of 1-based slots, each holding at most
//! one branch. This crate owns the table and the decisions made over it;
//! it performs no I/O. Fetching and persisting the table is the job of
//! `slotgrid-store`.
//!
//! # Components
//!
//! - **`types`** — `PoolState`, `SlotOccupant`, `Allocation`, JSON encoding
//! - **`allocator`** — allocate (reuse / first free / preempt), release, cleanup
//! - **`error`** — capacity errors

pub mod allocator;
pub mod error;
pub mod types;

pub use allocator::{Cleanup, allocate, cleanup, release};
pub use error::{PoolError, PoolResult};
pub use types::{
    Allocation, MAX_CAPACITY, PoolState, SlotOccupant, check_capacity, environment_name,
};
