//! slotgrid-store — persistence adapter for SlotGrid pools.
//!
//! Each pool lives in one string variable of a remote key/value store.
//! The store offers plain get / update / create and nothing else: no
//! transactions, no compare-and-set. Every allocation cycle is therefore
//! a non-atomic read-modify-write, and concurrent writers race with
//! last-writer-wins semantics.
//!
//! # Architecture
//!
//! ```text
//! PoolRepository
//!   ├── fetch(key, capacity)  → PoolState   (NotFound → empty pool)
//!   ├── store(key, &state)    → update, or create on NotFound,
//!   │                           retried with linear backoff
//!   └── Arc<dyn VariableStore>
//!       ├── MemoryVariableStore (tests, dry runs)
//!       └── RedbVariableStore   (on-disk)
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod naming;
pub mod redb_store;
pub mod repository;

pub use backend::{StoreFuture, UpdateOutcome, VariableStore};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryVariableStore;
pub use naming::{VARIABLE_PREFIX, variable_name};
pub use redb_store::RedbVariableStore;
pub use repository::{PoolRepository, RetryPolicy};
