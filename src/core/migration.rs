//! Version tracking and legacy format migration.
//!
//! Two things drift over time: the wrapper stubs sitting in place of real binaries (they embed
//! the version that generated them) and the rule documents (older releases used longer key
//! names). Both are reconciled here so the rest of the crate only sees the current shapes.

use crate::core::error::InterceptError;
use serde_json::{Map, Value as JsonValue};

/// Current intercept version from Cargo.toml
pub const INTERCEPT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Old rule document keys and their current names.
pub const LEGACY_KEYS: &[(&str, &str)] = &[
    ("args_to_take_away", "drop"),
    ("args_to_append", "append"),
    ("args_to_append_before", "prepend"),
    ("args_to_replace", "replace"),
    ("display_before_start", "announce"),
    ("notify_about_actions", "notify"),
];

/// Outcome of comparing a wrapper's embedded version with this binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapperCompat {
    Current,
    /// Wrapper predates version embedding; it still runs.
    Unversioned,
    /// Different version but same or older major; it still runs.
    Older(String),
}

/// Compare two version strings (simplified semver comparison)
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse_version =
        |v: &str| -> Vec<u32> { v.split('.').filter_map(|s| s.parse::<u32>().ok()).collect() };

    let a_parts = parse_version(a);
    let b_parts = parse_version(b);

    for (a_part, b_part) in a_parts.iter().zip(b_parts.iter()) {
        match a_part.cmp(b_part) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }

    a_parts.len().cmp(&b_parts.len())
}

fn major(version: &str) -> Option<u32> {
    version.trim().split('.').next()?.parse().ok()
}

/// Decide whether a wrapper generated by `embedded` may run under `current`.
///
/// Only a newer major version is fatal. An unparseable major counts as incompatible.
pub fn check_wrapper_version(embedded: &str, current: &str) -> Result<WrapperCompat, InterceptError> {
    let embedded = embedded.trim();
    if embedded.is_empty() {
        return Ok(WrapperCompat::Unversioned);
    }
    if compare_versions(embedded, current) == std::cmp::Ordering::Equal {
        return Ok(WrapperCompat::Current);
    }
    match (major(embedded), major(current)) {
        (Some(e), Some(c)) if e <= c => Ok(WrapperCompat::Older(embedded.to_string())),
        _ => Err(InterceptError::VersionMismatch {
            embedded: embedded.to_string(),
            current: current.to_string(),
        }),
    }
}

/// Rename legacy keys in a rule document to their current names.
///
/// Returns one notice per renamed key. When both spellings are present the current one wins
/// and the legacy value is discarded. `null` values are dropped so they fall back to defaults.
pub fn migrate_legacy_keys(doc: &mut Map<String, JsonValue>) -> Vec<String> {
    let mut notices = Vec::new();
    for (legacy, current) in LEGACY_KEYS {
        let Some(value) = doc.remove(*legacy) else {
            continue;
        };
        if doc.contains_key(*current) {
            notices.push(format!(
                "ignoring legacy key '{}' because '{}' is also set",
                legacy, current
            ));
        } else {
            notices.push(format!("legacy key '{}' read as '{}'", legacy, current));
            doc.insert((*current).to_string(), value);
        }
    }
    doc.retain(|_, v| !v.is_null());
    notices
}
