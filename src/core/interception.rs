//! The interception state machine.
//!
//! Each location of a tool is in one of three states:
//!
//! - `Original`: the real executable, untouched.
//! - `Intercepted`: a generated wrapper sits at the path and the real executable lives at
//!   `<path>-intercepted` (the stash).
//! - `Inconsistent`: a transition was interrupted or someone moved files by hand. These are
//!   reported, never repaired automatically, because a wrong guess can destroy the only copy of
//!   the real binary.
//!
//! Whether a file is a wrapper is decided by [`classify`] alone.
//!
//! There is no locking. Two operators running `intercept` and `undo` on the same tool at the
//! same time can interleave their renames; intercept is meant for one operator at a time.

use crate::core::error::{InterceptError, Transition};
use crate::core::journal;
use crate::core::migration::INTERCEPT_VERSION;
use crate::core::resolver::{SearchPath, stash_path};
use crate::core::rules::{RulesPresence, ensure_rules};
use crate::core::store::Store;
use crate::core::wrapper::{WRAPPER_SHELL, WrapperSpec, generate, is_wrapper};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inconsistency {
    /// Wrapper present, stash absent.
    StashMissing,
    /// Original present, but a stash exists too.
    StashOrphaned,
    /// Stash present, nothing at the path.
    WrapperMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Original,
    Intercepted,
    Inconsistent(Inconsistency),
}

/// Aggregate over every location of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolState {
    NotIntercepted,
    FullyIntercepted,
    PartiallyIntercepted,
}

/// Policy switches for tool-level transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterceptOptions {
    /// Proceed past policy refusals (partial interception). Per-path safety checks still run.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    pub path: PathBuf,
    pub stash: PathBuf,
    pub state: PathState,
}

/// Every location of one tool and its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionRecord {
    pub tool: String,
    pub paths: Vec<PathRecord>,
}

/// What a tool-level transition did, path by path.
#[derive(Debug, Default)]
pub struct TransitionReport {
    pub tool: String,
    pub changed: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, String)>,
    pub failures: Vec<(PathBuf, InterceptError)>,
    /// Rule document situation after an intercept.
    pub rules: Option<RulesPresence>,
    pub warnings: Vec<String>,
}

impl PathState {
    pub fn describe(&self) -> &'static str {
        match self {
            PathState::Original => "original",
            PathState::Intercepted => "intercepted",
            PathState::Inconsistent(Inconsistency::StashMissing) => {
                "wrapper installed but the original is missing"
            }
            PathState::Inconsistent(Inconsistency::StashOrphaned) => {
                "original present but a stashed copy also exists"
            }
            PathState::Inconsistent(Inconsistency::WrapperMissing) => {
                "stashed original present but nothing installed in its place"
            }
        }
    }
}

impl InterceptionRecord {
    pub fn state(&self) -> ToolState {
        fold_states(self.paths.iter().map(|p| p.state))
    }

    pub fn inconsistent(&self) -> impl Iterator<Item = &PathRecord> {
        self.paths
            .iter()
            .filter(|p| matches!(p.state, PathState::Inconsistent(_)))
    }
}

impl TransitionReport {
    fn new(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fold per-path states into the tool state.
pub fn fold_states(states: impl IntoIterator<Item = PathState>) -> ToolState {
    let mut all_original = true;
    let mut all_intercepted = true;
    for state in states {
        all_original &= state == PathState::Original;
        all_intercepted &= state == PathState::Intercepted;
    }
    match (all_original, all_intercepted) {
        (true, _) => ToolState::NotIntercepted,
        (false, true) => ToolState::FullyIntercepted,
        (false, false) => ToolState::PartiallyIntercepted,
    }
}

/// Decide the state of one location.
///
/// This is the single place that decides wrapper-ness, via the signature check in
/// [`is_wrapper`]. A file that merely contains the signature text is treated as a wrapper.
pub fn classify(path: &Path) -> Result<PathState, InterceptError> {
    let stash_present = fs::symlink_metadata(stash_path(path)).is_ok();
    if fs::symlink_metadata(path).is_err() {
        if stash_present {
            return Ok(PathState::Inconsistent(Inconsistency::WrapperMissing));
        }
        return Err(InterceptError::NotFound(format!(
            "{} does not exist",
            path.display()
        )));
    }
    Ok(match (is_wrapper(path)?, stash_present) {
        (true, true) => PathState::Intercepted,
        (true, false) => PathState::Inconsistent(Inconsistency::StashMissing),
        (false, true) => PathState::Inconsistent(Inconsistency::StashOrphaned),
        (false, false) => PathState::Original,
    })
}

/// Error describing why an inconsistent location cannot be transitioned.
pub fn inconsistency_error(path: &Path, kind: Inconsistency) -> InterceptError {
    match kind {
        Inconsistency::StashMissing => InterceptError::StashMissing {
            wrapper: path.to_path_buf(),
            stash: stash_path(path),
        },
        Inconsistency::StashOrphaned => InterceptError::InconsistentState {
            path: path.to_path_buf(),
            detail: format!(
                "{} already exists next to an unwrapped executable",
                stash_path(path).display()
            ),
        },
        Inconsistency::WrapperMissing => InterceptError::InconsistentState {
            path: path.to_path_buf(),
            detail: format!(
                "only the stashed original {} exists; move it back to restore the tool",
                stash_path(path).display()
            ),
        },
    }
}

/// Install a wrapper at `path`, stashing the original.
///
/// Refuses with `AlreadyIntercepted` if a stash already exists or the file already is a
/// wrapper; nothing is touched in that case. The wrapper gets the original's permission bits.
pub fn intercept_path(path: &Path, spec: &WrapperSpec) -> Result<(), InterceptError> {
    let stash = stash_path(path);
    if fs::symlink_metadata(&stash).is_ok() || is_wrapper(path)? {
        return Err(InterceptError::AlreadyIntercepted(path.display().to_string()));
    }
    let link_meta = fs::symlink_metadata(path)?;
    let permissions = fs::metadata(path)?.permissions();

    if link_meta.file_type().is_symlink() {
        // Stash the link itself so undo restores it unchanged.
        fs::rename(path, &stash)?;
    } else {
        copy_then_remove(path, &stash, |p| fs::remove_file(p))?;
    }

    fs::write(path, generate(spec))?;
    fs::set_permissions(path, permissions)?;
    Ok(())
}

/// Copy `path` to `stash`, then remove `path`. If the removal fails the fresh copy is deleted
/// again, so the location stays `Original` instead of turning `StashOrphaned`.
fn copy_then_remove(
    path: &Path,
    stash: &Path,
    remove: impl FnOnce(&Path) -> std::io::Result<()>,
) -> Result<(), InterceptError> {
    fs::copy(path, stash)?;
    if let Err(e) = remove(path) {
        let _ = fs::remove_file(stash);
        return Err(e.into());
    }
    Ok(())
}

/// Remove the wrapper at `path` and move the stashed original back.
pub fn undo_path(path: &Path) -> Result<(), InterceptError> {
    if !is_wrapper(path)? {
        return Err(InterceptError::NotIntercepted(path.display().to_string()));
    }
    let stash = stash_path(path);
    if fs::symlink_metadata(&stash).is_err() {
        return Err(InterceptError::StashMissing {
            wrapper: path.to_path_buf(),
            stash,
        });
    }
    fs::remove_file(path)?;
    fs::rename(&stash, path)?;
    Ok(())
}

/// Tool-level transitions over every location of a name.
pub struct Interceptor<'a> {
    store: &'a Store,
    search: &'a SearchPath,
    interpreter: PathBuf,
}

impl<'a> Interceptor<'a> {
    pub fn new(store: &'a Store, search: &'a SearchPath, interpreter: PathBuf) -> Self {
        Self {
            store,
            search,
            interpreter,
        }
    }

    pub fn wrapper_spec(&self, tool: &str, path: &Path) -> WrapperSpec {
        WrapperSpec {
            tool: tool.to_string(),
            stash: stash_path(path),
            interpreter: self.interpreter.clone(),
            config_dir: self.store.root.clone(),
            version: INTERCEPT_VERSION.to_string(),
        }
    }

    /// Classify every location of `tool`. `NotFound` when there is none.
    pub fn record(&self, tool: &str) -> Result<InterceptionRecord, InterceptError> {
        let candidates = self.search.candidates(tool)?;
        if candidates.is_empty() {
            return Err(InterceptError::NotFound(format!(
                "{} not found on the search path",
                tool
            )));
        }
        let mut paths = Vec::with_capacity(candidates.len());
        for path in candidates {
            let state = classify(&path)?;
            paths.push(PathRecord {
                stash: stash_path(&path),
                path,
                state,
            });
        }
        Ok(InterceptionRecord {
            tool: tool.to_string(),
            paths,
        })
    }

    pub fn tool_state(&self, tool: &str) -> Result<ToolState, InterceptError> {
        Ok(self.record(tool)?.state())
    }

    /// Fail with `NotIntercepted` unless at least one location is wrapped.
    pub fn require_intercepted(&self, tool: &str) -> Result<(), InterceptError> {
        match self.tool_state(tool)? {
            ToolState::NotIntercepted => Err(InterceptError::NotIntercepted(tool.to_string())),
            _ => Ok(()),
        }
    }

    /// Wrap every original location of `tool` and make sure it has a rule document.
    pub fn intercept_tool(
        &self,
        tool: &str,
        opts: InterceptOptions,
    ) -> Result<TransitionReport, InterceptError> {
        let record = self.record(tool)?;
        match record.state() {
            ToolState::FullyIntercepted => {
                return Err(InterceptError::AlreadyIntercepted(tool.to_string()));
            }
            ToolState::PartiallyIntercepted if !opts.force => {
                return Err(InterceptError::PartiallyIntercepted {
                    tool: tool.to_string(),
                    op: Transition::Intercept,
                });
            }
            _ => {}
        }
        for entry in &record.paths {
            self.refuse_wrapper_dependency(&entry.path)?;
        }

        let mut report = TransitionReport::new(tool);
        for entry in record.paths {
            match entry.state {
                PathState::Original => {
                    let spec = self.wrapper_spec(tool, &entry.path);
                    let result = intercept_path(&entry.path, &spec);
                    self.settle(&mut report, "intercept.path", entry.path, result);
                }
                PathState::Intercepted => report
                    .skipped
                    .push((entry.path, "already intercepted".to_string())),
                PathState::Inconsistent(kind) => {
                    let err = inconsistency_error(&entry.path, kind);
                    report.failures.push((entry.path, err));
                }
            }
        }

        match ensure_rules(self.store, tool) {
            Ok(presence) => report.rules = Some(presence),
            // Locations may already be wrapped; keep the report so they are still listed.
            Err(e) => report.failures.push((self.store.root.join(tool), e)),
        }
        Ok(report)
    }

    /// Restore every wrapped location of `tool`. Rule documents are left in place.
    pub fn undo_tool(
        &self,
        tool: &str,
        opts: InterceptOptions,
    ) -> Result<TransitionReport, InterceptError> {
        let record = self.record(tool)?;
        match record.state() {
            ToolState::NotIntercepted => {
                return Err(InterceptError::NotIntercepted(tool.to_string()));
            }
            ToolState::PartiallyIntercepted if !opts.force => {
                return Err(InterceptError::PartiallyIntercepted {
                    tool: tool.to_string(),
                    op: Transition::Undo,
                });
            }
            _ => {}
        }

        let mut report = TransitionReport::new(tool);
        for entry in record.paths {
            match entry.state {
                PathState::Intercepted => {
                    let result = undo_path(&entry.path);
                    self.settle(&mut report, "undo.path", entry.path, result);
                }
                PathState::Original => report
                    .skipped
                    .push((entry.path, "not intercepted".to_string())),
                PathState::Inconsistent(kind) => {
                    let err = inconsistency_error(&entry.path, kind);
                    report.failures.push((entry.path, err));
                }
            }
        }
        Ok(report)
    }

    /// Wrappers run through `/bin/sh` and the interpreter; wrapping either would leave the
    /// wrapper calling itself.
    fn refuse_wrapper_dependency(&self, path: &Path) -> Result<(), InterceptError> {
        let Ok(location) = fs::canonicalize(path) else {
            return Ok(());
        };
        for dependency in [Path::new(WRAPPER_SHELL), self.interpreter.as_path()] {
            if fs::canonicalize(dependency).is_ok_and(|d| d == location) {
                return Err(InterceptError::ValidationError(format!(
                    "refusing to intercept {}: wrappers depend on {}",
                    path.display(),
                    dependency.display()
                )));
            }
        }
        Ok(())
    }

    fn settle(
        &self,
        report: &mut TransitionReport,
        op: &str,
        path: PathBuf,
        result: Result<(), InterceptError>,
    ) {
        let status = match &result {
            Ok(()) => "success".to_string(),
            Err(e) => e.to_string(),
        };
        if let Err(e) = journal::record(self.store, op, &report.tool, Some(&path), &status) {
            report.warnings.push(format!("could not write journal: {}", e));
        }
        match result {
            Ok(()) => report.changed.push(path),
            Err(e) => report.failures.push((path, e)),
        }
    }
}
