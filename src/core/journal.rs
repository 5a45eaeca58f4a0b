//! Append-only audit journal of state changes.
//!
//! Every intercept, undo and rule edit appends one JSON line to
//! `<config_dir>/.intercept.events.jsonl`, so an operator can reconstruct what happened to a
//! binary.

use crate::core::error::InterceptError;
use crate::core::store::Store;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use ulid::Ulid;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JournalEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub tool: String,
    pub path: Option<String>,
    pub status: String,
}

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

/// The human behind the invocation, looking through `sudo`.
pub fn current_actor() -> String {
    ["SUDO_USER", "USER", "LOGNAME"]
        .iter()
        .find_map(|k| std::env::var(k).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Append one event. `status` is `"success"` or an error description.
pub fn record(
    store: &Store,
    op: &str,
    tool: &str,
    path: Option<&Path>,
    status: &str,
) -> Result<(), InterceptError> {
    let ev = JournalEvent {
        ts: now_epoch_z(),
        event_id: Ulid::new().to_string(),
        actor: current_actor(),
        op: op.to_string(),
        tool: tool.to_string(),
        path: path.map(|p| p.to_string_lossy().into_owned()),
        status: status.to_string(),
    };
    let line = serde_json::to_string(&ev)
        .map_err(|e| InterceptError::ValidationError(format!("cannot encode event: {}", e)))?;

    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(store.journal_path())?;
    writeln!(f, "{}", line)?;
    Ok(())
}

/// Read every event back. Malformed lines are skipped.
pub fn read_events(store: &Store) -> Result<Vec<JournalEvent>, InterceptError> {
    let path = store.journal_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}
