//! Scheduler error types.

use thiserror::Error;

/// Errors that abort a scheduling operation.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("branch name must not be empty")]
    EmptyBranch,

    #[error(transparent)]
    Pool(#[from] slotgrid_pool::PoolError),

    #[error(transparent)]
    Store(#[from] slotgrid_store::StoreError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
