//! RedbVariableStore — redb-backed variable store.
//!
//! Stores each variable as a `&str → &str` row in a single `variables`
//! table. Supports both on-disk and in-memory backends (the latter for
//! testing). Calls complete synchronously inside the returned futures;
//! redb transactions are short enough that this does not stall the runtime.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::backend::{StoreFuture, UpdateOutcome, VariableStore};
use crate::error::{StoreError, StoreResult};

/// Variables keyed by name, valued by their raw string content.
const VARIABLES: TableDefinition<&str, &str> = TableDefinition::new("variables");

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Same as `map_err!` for the keyed read/write variants.
macro_rules! map_keyed_err {
    ($variant:ident, $key:expr) => {
        |e| StoreError::$variant {
            key: $key.to_string(),
            message: e.to_string(),
        }
    };
}

/// Thread-safe variable store backed by redb.
#[derive(Clone)]
pub struct RedbVariableStore {
    db: Arc<Database>,
}

impl RedbVariableStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "variable store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory variable store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(VARIABLES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read a variable.
    pub fn get_sync(&self, key: &str) -> StoreResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_keyed_err!(Read, key))?;
        let table = txn.open_table(VARIABLES).map_err(map_keyed_err!(Read, key))?;
        let value = table
            .get(key)
            .map_err(map_keyed_err!(Read, key))?
            .map(|guard| guard.value().to_string());
        Ok(value)
    }

    /// Overwrite a variable if it exists.
    pub fn update_sync(&self, key: &str, value: &str) -> StoreResult<UpdateOutcome> {
        let txn = self.db.begin_write().map_err(map_keyed_err!(Write, key))?;
        {
            let mut table = txn.open_table(VARIABLES).map_err(map_keyed_err!(Write, key))?;
            let exists = table.get(key).map_err(map_keyed_err!(Write, key))?.is_some();
            if !exists {
                return Ok(UpdateOutcome::NotFound);
            }
            table.insert(key, value).map_err(map_keyed_err!(Write, key))?;
        }
        txn.commit().map_err(map_keyed_err!(Write, key))?;
        debug!(%key, bytes = value.len(), "variable updated");
        Ok(UpdateOutcome::Updated)
    }

    /// Create a variable, failing if it already exists.
    pub fn create_sync(&self, key: &str, value: &str) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_keyed_err!(Write, key))?;
        {
            let mut table = txn.open_table(VARIABLES).map_err(map_keyed_err!(Write, key))?;
            let exists = table.get(key).map_err(map_keyed_err!(Write, key))?.is_some();
            if exists {
                return Err(StoreError::AlreadyExists(key.to_string()));
            }
            table.insert(key, value).map_err(map_keyed_err!(Write, key))?;
        }
        txn.commit().map_err(map_keyed_err!(Write, key))?;
        debug!(%key, bytes = value.len(), "variable created");
        Ok(())
    }

    /// List all variable names.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VARIABLES).map_err(map_err!(Table))?;
        let mut keys = Vec::new();
        for entry in table.iter().map_err(map_keyed_err!(Read, "*"))? {
            let (key, _) = entry.map_err(map_keyed_err!(Read, "*"))?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl VariableStore for RedbVariableStore {
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
