//! Runtime side of a wrapper: what happens when an intercepted tool is invoked.
//!
//! The wrapper script execs `intercept run-wrapped`, which lands here. We check that the
//! wrapper is compatible with this binary, load the tool's rules, rewrite the arguments and
//! replace the current process with the stashed original.

use crate::core::error::InterceptError;
use crate::core::migration::{INTERCEPT_VERSION, WrapperCompat, check_wrapper_version};
use crate::core::output;
use crate::core::rewrite::{Rewrite, rewrite};
use crate::core::rules::load_rules;
use crate::core::store::Store;
use std::path::{Path, PathBuf};

/// Arguments a wrapper passes to `run-wrapped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub tool: String,
    pub stash: PathBuf,
    pub wrapper_version: String,
    /// Received argument vector, `argv[0]` first.
    pub argv: Vec<String>,
}

/// Everything up to the exec: version check, rule loading, rewriting and messages.
pub fn prepare(store: &Store, req: &LaunchRequest) -> Result<Rewrite, InterceptError> {
    match check_wrapper_version(&req.wrapper_version, INTERCEPT_VERSION)? {
        WrapperCompat::Unversioned => output::warn(&format!(
            "the wrapper for {} predates versioned wrappers; re-create it with `intercept undo {} && intercept {}`",
            req.tool, req.tool, req.tool
        )),
        WrapperCompat::Current | WrapperCompat::Older(_) => {}
    }

    let loaded = load_rules(store, &req.tool)?;
    for notice in &loaded.notices {
        output::warn(&format!(
            "{} configuration: {} (run `intercept check {}` to update it)",
            req.tool, notice, req.tool
        ));
    }

    let argv = if req.argv.is_empty() {
        vec![req.tool.clone()]
    } else {
        req.argv.clone()
    };
    let result = rewrite(&argv, &loaded.rules);
    for note in &result.notes {
        eprintln!("{}", note);
    }
    if let Some(line) = &result.announcement {
        eprintln!("{}", line);
    }
    Ok(result)
}

/// Prepare, then replace this process with the stashed original. Only returns on failure.
pub fn launch(store: &Store, req: &LaunchRequest) -> InterceptError {
    match prepare(store, req) {
        Ok(result) => exec_replace(&req.stash, &result.argv),
        Err(e) => e,
    }
}

/// Replace the current process image with `program`, keeping `argv[0]` as given.
#[cfg(unix)]
pub fn exec_replace(program: &Path, argv: &[String]) -> InterceptError {
    use std::os::unix::process::CommandExt;

    let mut cmd = std::process::Command::new(program);
    if let Some((arg0, rest)) = argv.split_first() {
        cmd.arg0(arg0).args(rest);
    }
    // exec() only returns on error
    let err = cmd.exec();
    InterceptError::IoError(std::io::Error::new(
        err.kind(),
        format!("failed to exec {}: {}", program.display(), err),
    ))
}

/// Without exec, run the original as a child with inherited stdio and mirror its exit code.
#[cfg(not(unix))]
pub fn exec_replace(program: &Path, argv: &[String]) -> InterceptError {
    let rest = argv.get(1..).unwrap_or_default();
    match std::process::Command::new(program).args(rest).status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(e) => e.into(),
    }
}
