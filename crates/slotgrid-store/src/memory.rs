//! In-memory variable store.
//!
//! Used by tests and dry runs. Write failures can be scripted to exercise
//! the repository's retry path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::backend::{StoreFuture, UpdateOutcome, VariableStore};
use crate::error::{StoreError, StoreResult};

/// Variable store held in process memory. Clones share the same variables.
#[derive(Debug, Clone, Default)]
pub struct MemoryVariableStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    vars: Mutex<HashMap<String, String>>,
    /// Remaining update/create calls that fail before writes succeed again.
    failing_writes: AtomicU32,
    failing_creates: AtomicU32,
    read_failures: AtomicU32,
    updates: AtomicU32,
    creates: AtomicU32,
}

impl MemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` update/create calls fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` create calls fail, leaving updates alone.
    pub fn fail_next_creates(&self, count: u32) {
        self.inner.failing_creates.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` get calls fail.
    pub fn fail_next_reads(&self, count: u32) {
        self.inner.read_failures.store(count, Ordering::SeqCst);
    }

    /// Number of update calls received, including failed ones.
    pub fn update_calls(&self) -> u32 {
        self.inner.updates.load(Ordering::SeqCst)
    }

    /// Number of create calls received, including failed ones.
    pub fn create_calls(&self) -> u32 {
        self.inner.creates.load(Ordering::SeqCst)
    }

    /// Current value of a variable, bypassing failure injection.
    pub fn value(&self, key: &str) -> Option<String> {
        self.vars().get(key).cloned()
    }

    /// Seed a variable directly.
    pub fn insert(&self, key: &str, value: &str) {
        self.vars().insert(key.to_string(), value.to_string());
    }

    fn vars(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still structurally valid.
        self.inner
            .vars
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn get_sync(&self, key: &str) -> StoreResult<Option<String>> {
        if Self::take_failure(&self.inner.read_failures) {
            return Err(StoreError::Read {
                key: key.to_string(),
                message: "injected read failure".to_string(),
            });
        }
        Ok(self.vars().get(key).cloned())
    }

    fn update_sync(&self, key: &str, value: &str) -> StoreResult<UpdateOutcome> {
        self.inner.updates.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.inner.failing_writes) {
            return Err(StoreError::Write {
                key: key.to_string(),
                message: "injected write failure".to_string(),
            });
        }
        let mut vars = self.vars();
        match vars.get_mut(key) {
            Some(existing) => {
                *existing = value.to_string();
                debug!(%key, "variable updated");
                Ok(UpdateOutcome::Updated)
            }
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    fn create_sync(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.creates.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.inner.failing_creates)
            || Self::take_failure(&self.inner.failing_writes)
        {
            return Err(StoreError::Write {
                key: key.to_string(),
                message: "injected write failure".to_string(),
            });
        }
        let mut vars = self.vars();
        if vars.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        vars.insert(key.to_string(), value.to_string());
        debug!(%key, "variable created");
        Ok(())
    }
}

impl VariableStore for MemoryVariableStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { self.get_sync(key) })
    }

    fn update<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, UpdateOutcome> {
        Box::pin(async move { self.update_sync(key, value) })
    }

    fn create<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move { self.create_sync(key, value) })
    }
}
