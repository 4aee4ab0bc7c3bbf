//! Variable naming for pool state.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{StoreError, StoreResult};

/// Namespace token prepended to every pool variable.
pub const VARIABLE_PREFIX: &str = "SLOT_POOL_";

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^A-Za-z0-9]+").expect("static regex"));

/// Derive the store variable holding the state of `pool_name`.
///
/// The name is uppercased and every run of non-alphanumeric characters
/// collapses to a single `_`.
pub fn variable_name(pool_name: &str) -> StoreResult<String> {
    if !pool_name.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(StoreError::InvalidPoolName(pool_name.to_string()));
    }
    let normalized = SEPARATORS.replace_all(pool_name, "_");
    Ok(format!("{VARIABLE_PREFIX}{}", normalized.to_ascii_uppercase()))
}
