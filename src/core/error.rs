use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Which tool-level transition was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Intercept,
    Undo,
}

impl Transition {
    /// The command line that requests this transition for `tool`.
    pub fn command(&self, tool: &str) -> String {
        match self {
            Transition::Intercept => format!("intercept {}", tool),
            Transition::Undo => format!("intercept undo {}", tool),
        }
    }
}

#[derive(Error, Debug)]
pub enum InterceptError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Configuration for {name} is invalid: {reason}")]
    InvalidFormat { name: String, reason: String },
    #[error("{0} is already intercepted")]
    AlreadyIntercepted(String),
    #[error("{0} is not intercepted")]
    NotIntercepted(String),
    #[error("{} is intercepted but its original is missing (expected at {})", wrapper.display(), stash.display())]
    StashMissing { wrapper: PathBuf, stash: PathBuf },
    #[error("{} is in an inconsistent state: {detail}", path.display())]
    InconsistentState { path: PathBuf, detail: String },
    #[error("{tool} is only partially intercepted")]
    PartiallyIntercepted { tool: String, op: Transition },
    #[error("{failed} location(s) of {tool} could not be changed")]
    TransitionIncomplete { tool: String, failed: usize },
    #[error("Wrapper was generated by intercept {embedded}, which is newer than this intercept ({current})")]
    VersionMismatch { embedded: String, current: String },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Settings error: {0}")]
    SettingsError(String),
}

impl InterceptError {
    /// The command an operator should run next, when there is one.
    pub fn hint(&self) -> Option<String> {
        match self {
            InterceptError::AlreadyIntercepted(tool) => Some(format!(
                "run `intercept status {}` to inspect, or `intercept undo {}` first",
                tool, tool
            )),
            InterceptError::NotIntercepted(tool) => {
                Some(format!("run `intercept {}` to intercept it first", tool))
            }
            InterceptError::PartiallyIntercepted { tool, op } => Some(format!(
                "to clean this up, call: {} --force",
                op.command(tool)
            )),
            InterceptError::StashMissing { wrapper, .. } => Some(format!(
                "no automatic repair is attempted; reinstall the real binary at {} by hand",
                wrapper.display()
            )),
            InterceptError::InconsistentState { path, .. } => Some(format!(
                "inspect {} and its -intercepted copy by hand; intercept will not guess a repair",
                path.display()
            )),
            InterceptError::InvalidFormat { name, .. } => Some(format!(
                "fix it with `intercept edit {}` or start over with `intercept reset {}`",
                name, name
            )),
            InterceptError::VersionMismatch { .. } => {
                Some("upgrade intercept, or re-create the wrapper with this version".to_string())
            }
            _ => None,
        }
    }
}
