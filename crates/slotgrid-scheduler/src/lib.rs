//! slotgrid-scheduler — preview-environment scheduling over a slot pool.
//!
//! Every operation is one non-atomic cycle against the remote store:
//!
//! ```text
//! SlotScheduler
//!   ├── PoolRepository::fetch   (variable → PoolState)
//!   ├── allocate | release | cleanup   (slotgrid-pool, pure)
//!   └── PoolRepository::store   (PoolState → variable, retried)
//! ```
//!
//! Nothing guards the variable between fetch and store. Two concurrent
//! invocations on the same pool can both read one snapshot, and the later
//! write silently discards the earlier decision.

pub mod error;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{
    DeployEvent, DeployOutcome, PRODUCTION_BRANCH, PRODUCTION_ENVIRONMENT, Release,
    SlotScheduler, fixed_environment,
};
