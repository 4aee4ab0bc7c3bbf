//! The remote variable store capability.
//!
//! Pool state is persisted through this trait so the repository never
//! depends on a concrete backend. Implementations are injected at
//! construction time, which keeps the repository testable against an
//! in-memory store with scripted failures.

use std::future::Future;
use std::pin::Pin;

use crate::error::StoreResult;

/// Boxed future alias for variable store results.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Result of an update-in-place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The variable does not exist yet; nothing was written.
    NotFound,
}

/// A remote store of named string variables.
///
/// There is no conditional write: `update` overwrites whatever is there.
pub trait VariableStore: Send + Sync {
    /// Read a variable. `Ok(None)` means the variable does not exist.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Overwrite an existing variable.
    fn update<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, UpdateOutcome>;

    /// Create a variable that does not exist yet.
    fn create<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()>;
}
