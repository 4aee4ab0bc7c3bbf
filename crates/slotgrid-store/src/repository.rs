//! PoolRepository — fetches and persists pool state through a variable store.
//!
//! Reads are single-shot: a missing variable becomes an empty pool, any
//! other read failure propagates to the caller. Writes go through a
//! bounded retry loop:
//!
//! ```text
//! Updating ──Updated──────────────────────────────▶ Done
//!    │ NotFound
//!    ▼
//! Creating ──ok───────────────────────────────────▶ Done
//!
//! any error ─▶ RetryPending(attempt + 1) ─sleep─▶ Updating
//!          └─ attempt == max_attempts ───────────▶ Failed
//! ```
//!
//! There is no version check on write. Two invocations that fetch the same
//! snapshot will both write, and the later write wins.

use std::sync::Arc;
use std::time::Duration;

use slotgrid_pool::{PoolState, check_capacity};
use tracing::{debug, warn};

use crate::backend::{UpdateOutcome, VariableStore};
use crate::error::{StoreError, StoreResult};

/// Bounded retry with linearly increasing delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total write attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the given failed attempt (1-based). Saturates at
    /// `Duration::MAX`.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(failed_attempt)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Step of a single `store` call.
#[derive(Debug)]
enum WriteStep {
    Updating { attempt: u32 },
    Creating { attempt: u32 },
    RetryPending { attempt: u32, last_error: StoreError },
}

/// Reads and writes whole pool states under their variable keys.
#[derive(Clone)]
pub struct PoolRepository {
    store: Arc<dyn VariableStore>,
    retry: RetryPolicy,
}

impl PoolRepository {
    pub fn new(store: Arc<dyn VariableStore>) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    pub fn with_retry(store: Arc<dyn VariableStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Load the pool stored under `key`, sized to `capacity`.
    ///
    /// A missing variable yields an empty pool. Malformed content yields an
    /// empty pool too (with a warning). A stored pool larger than `capacity`
    /// is rejected.
    pub async fn fetch(&self, key: &str, capacity: u32) -> StoreResult<PoolState> {
        check_capacity(capacity)?;
        match self.store.get(key).await? {
            Some(value) => {
                debug!(%key, bytes = value.len(), "pool state fetched");
                Ok(PoolState::parse(&value, capacity)?)
            }
            None => {
                debug!(%key, capacity, "no stored pool state, starting empty");
                Ok(PoolState::empty(capacity))
            }
        }
    }

    /// Overwrite the variable under `key` with `state`.
    ///
    /// On final failure the previous stored value is left as it was.
    pub async fn store(&self, key: &str, state: &PoolState) -> StoreResult<()> {
        let value = state
            .to_json()
            .map_err(|e| StoreError::Serialize(e.to_string()))?;

        let mut step = WriteStep::Updating { attempt: 1 };
        loop {
            step = match step {
                WriteStep::Updating { attempt } => match self.store.update(key, &value).await {
                    Ok(UpdateOutcome::Updated) => {
                        debug!(%key, attempt, "pool state saved");
                        return Ok(());
                    }
                    Ok(UpdateOutcome::NotFound) => WriteStep::Creating { attempt },
                    Err(e) => self.after_failure(key, attempt, e)?,
                },
                WriteStep::Creating { attempt } => match self.store.create(key, &value).await {
                    Ok(()) => {
                        debug!(%key, attempt, "pool state created");
                        return Ok(());
                    }
                    Err(e) => self.after_failure(key, attempt, e)?,
                },
                WriteStep::RetryPending {
                    attempt,
                    last_error,
                } => {
                    let delay = self.retry.delay_after(attempt - 1);
                    warn!(
                        %key,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        ?delay,
                        error = %last_error,
                        "pool state write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    WriteStep::Updating { attempt }
                }
            };
        }
    }

    /// Next step after `attempt` failed, or the terminal error.
    fn after_failure(&self, key: &str, attempt: u32, error: StoreError) -> StoreResult<WriteStep> {
        if attempt >= self.retry.max_attempts {
            return Err(StoreError::RetriesExhausted {
                key: key.to_string(),
                attempts: attempt,
                source: Box::new(error),
            });
        }
        Ok(WriteStep::RetryPending {
            attempt: attempt + 1,
            last_error: error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StoreFuture;
    use crate::memory::MemoryVariableStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use chrono::{DateTime, Utc};
    use slotgrid_pool::{PoolError, allocate};
    use tokio::time::Instant;

    const KEY: &str = "SLOT_POOL_QA";

    fn repo(store: &MemoryVariableStore) -> PoolRepository {
        PoolRepository::new(Arc::new(store.clone()))
    }

    fn now() -> DateTime<Utc> {
        "2024-01-15T10:00:00Z".parse().unwrap()
    }

    fn occupied_pool() -> PoolState {
        let mut state = PoolState::empty(2);
        allocate(&mut state, "feature/a", "qa", now()).unwrap();
        state
    }

    // ── fetch ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn fetch_missing_returns_empty_pool() {
        let store = MemoryVariableStore::new();
        let state = repo(&store).fetch(KEY, 3).await.unwrap();
        assert_eq!(state, PoolState::empty(3));
    }

    #[tokio::test]
    async fn fetch_parses_stored_value() {
        let store = MemoryVariableStore::new();
        let stored = occupied_pool();
        store.insert(KEY, &stored.to_json().unwrap());

        let state = repo(&store).fetch(KEY, 2).await.unwrap();
        assert_eq!(state, stored);
    }

    #[tokio::test]
    async fn fetch_malformed_value_returns_empty_pool() {
        let store = MemoryVariableStore::new();
        store.insert(KEY, "{not json");

        let state = repo(&store).fetch(KEY, 4).await.unwrap();
        assert_eq!(state, PoolState::empty(4));
    }

    #[tokio::test]
    async fn fetch_expands_smaller_stored_pool() {
        let store = MemoryVariableStore::new();
        store.insert(KEY, &occupied_pool().to_json().unwrap());

        let state = repo(&store).fetch(KEY, 5).await.unwrap();
        assert_eq!(state.capacity(), 5);
        assert_eq!(state.find_slot_by_branch("feature/a"), Some(1));
    }

    #[tokio::test]
    async fn fetch_rejects_larger_stored_pool() {
        let store = MemoryVariableStore::new();
        store.insert(KEY, &PoolState::empty(4).to_json().unwrap());

        let err = repo(&store).fetch(KEY, 2).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Pool(PoolError::InvalidCapacityShrink {
                current: 4,
                requested: 2
            })
        ));
    }

    #[tokio::test]
    async fn fetch_read_failure_propagates_without_retry() {
        let store = MemoryVariableStore::new();
        store.fail_next_reads(1);

        let err = repo(&store).fetch(KEY, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::Read { .. }));
    }

    // ── store ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn store_creates_missing_variable() {
        let store = MemoryVariableStore::new();
        let state = occupied_pool();

        repo(&store).store(KEY, &state).await.unwrap();

        assert_eq!(store.update_calls(), 1);
        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.value(KEY), Some(state.to_json().unwrap()));
    }

    #[tokio::test]
    async fn store_updates_existing_variable() {
        let store = MemoryVariableStore::new();
        store.insert(KEY, &PoolState::empty(2).to_json().unwrap());
        let state = occupied_pool();

        repo(&store).store(KEY, &state).await.unwrap();

        assert_eq!(store.update_calls(), 1);
        assert_eq!(store.create_calls(), 0);
        assert_eq!(store.value(KEY), Some(state.to_json().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn store_retries_transient_failures_with_linear_backoff() {
        let store = MemoryVariableStore::new();
        store.insert(KEY, "{}");
        store.fail_next_writes(2);
        let state = occupied_pool();

        let started = Instant::now();
        repo(&store).store(KEY, &state).await.unwrap();

        // 1s after the first failure, 2s after the second.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
        assert_eq!(store.update_calls(), 3);
        assert_eq!(store.value(KEY), Some(state.to_json().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn store_gives_up_after_max_attempts() {
        let store = MemoryVariableStore::new();
        store.insert(KEY, "previous");
        store.fail_next_writes(10);

        let err = repo(&store).store(KEY, &occupied_pool()).await.unwrap_err();

        match err {
            StoreError::RetriesExhausted { key, attempts, source } => {
                assert_eq!(key, KEY);
                assert_eq!(attempts, 3);
                assert!(matches!(*source, StoreError::Write { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.update_calls(), 3);
        assert_eq!(store.value(KEY).as_deref(), Some("previous"));
    }

    #[tokio::test(start_paused = true)]
    async fn store_retries_failed_create() {
        let store = MemoryVariableStore::new();
        store.fail_next_creates(1);
        let state = occupied_pool();

        let started = Instant::now();
        repo(&store).store(KEY, &state).await.unwrap();

        // update → NotFound → create fails → 1s → update → NotFound → create.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
        assert_eq!(store.update_calls(), 2);
        assert_eq!(store.create_calls(), 2);
        assert_eq!(store.value(KEY), Some(state.to_json().unwrap()));
    }

    /// Store where another writer creates the variable just before our
    /// first create lands.
    struct ContendedCreate {
        inner: MemoryVariableStore,
        raced: AtomicBool,
    }

    impl VariableStore for ContendedCreate {
        fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
            self.inner.get(key)
        }

        fn update<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, UpdateOutcome> {
            self.inner.update(key, value)
        }

        fn create<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.insert(key, "other-writer");
            }
            self.inner.create(key, value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn store_recovers_when_create_loses_race() {
        let inner = MemoryVariableStore::new();
        let repository = PoolRepository::new(Arc::new(ContendedCreate {
            inner: inner.clone(),
            raced: AtomicBool::new(false),
        }));
        let state = occupied_pool();

        repository.store(KEY, &state).await.unwrap();

        // update → NotFound → create → AlreadyExists → 1s → update succeeds.
        assert_eq!(inner.update_calls(), 2);
        assert_eq!(inner.create_calls(), 1);
        assert_eq!(inner.value(KEY), Some(state.to_json().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn store_single_attempt_policy_does_not_sleep() {
        let store = MemoryVariableStore::new();
        store.fail_next_writes(1);
        let repository = PoolRepository::with_retry(
            Arc::new(store.clone()),
            RetryPolicy::new(1, Duration::from_secs(5)),
        );

        let started = Instant::now();
        let err = repository.store(KEY, &occupied_pool()).await.unwrap_err();

        assert!(matches!(err, StoreError::RetriesExhausted { attempts: 1, .. }));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn retry_policy_delays_grow_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn retry_policy_delay_saturates() {
        let policy = RetryPolicy::new(3, Duration::from_secs(u64::MAX));
        assert_eq!(policy.delay_after(1), Duration::from_secs(u64::MAX));
        assert_eq!(policy.delay_after(2), Duration::MAX);
    }

    #[tokio::test]
    async fn fetch_rejects_oversized_capacity() {
        let store = MemoryVariableStore::new();
        let err = repo(&store).fetch(KEY, u32::MAX).await.unwrap_err();
        assert!(matches!(err, StoreError::Pool(PoolError::CapacityTooLarge { .. })));
    }
}
