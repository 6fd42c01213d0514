//! Pure config-merge functions.
//!
//! "Base defaults overridden by per-run config" is always a shallow,
//! key-level overlay: values in the override replace whole values in the
//! base, nested objects are not merged.

use modules::Record;

/// Return `base` with every key of `overrides` laid over it.
pub fn merge_config(base: &Record, overrides: &Record) -> Record {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
