//! slotgrid.toml configuration parser.
//!
//! Every field is optional; command-line flags take precedence over the
//! file, and the file over built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use slotgrid_store::RetryPolicy;

/// Default location of the redb state file.
pub const DEFAULT_STORE_PATH: &str = ".slotgrid/state.redb";

/// Default idle age, in days, after which cleanup frees a slot.
pub const DEFAULT_CLEANUP_DAYS: u32 = 7;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotgridConfig {
    pub store: Option<StoreConfig>,
    pub retry: Option<RetryConfig>,
    pub pool: Option<PoolConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: Option<String>,
    pub capacity: Option<u32>,
    pub cleanup_days: Option<u32>,
}

impl SlotgridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SlotgridConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if given, otherwise fall back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn store_path(&self) -> PathBuf {
        self.store
            .as_ref()
            .and_then(|s| s.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let default = RetryPolicy::default();
        let Some(retry) = &self.retry else {
            return default;
        };
        RetryPolicy::new(
            retry.max_attempts.unwrap_or(default.max_attempts),
            retry
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(default.base_delay),
        )
    }

    pub fn pool_name(&self) -> Option<&str> {
        self.pool.as_ref().and_then(|p| p.name.as_deref())
    }

    pub fn pool_capacity(&self) -> Option<u32> {
        self.pool.as_ref().and_then(|p| p.capacity)
    }

    pub fn cleanup_days(&self) -> u32 {
        self.pool
            .as_ref()
            .and_then(|p| p.cleanup_days)
            .unwrap_or(DEFAULT_CLEANUP_DAYS)
    }

    /// Scaffold a minimal slotgrid.toml for one pool.
    pub fn scaffold(pool: &str, capacity: u32) -> Self {
        SlotgridConfig {
            store: Some(StoreConfig {
                path: Some(PathBuf::from(DEFAULT_STORE_PATH)),
            }),
            retry: Some(RetryConfig {
                max_attempts: Some(3),
                base_delay_ms: Some(1000),
            }),
            pool: Some(PoolConfig {
                name: Some(pool.to_string()),
                capacity: Some(capacity),
                cleanup_days: Some(DEFAULT_CLEANUP_DAYS),
            }),
        }
    }
}
