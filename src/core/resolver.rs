//! Locating executables by name.
//!
//! A name may be installed in several places (`/usr/bin/curl` and `/usr/local/bin/curl`), and
//! every one of them has to be wrapped for the interception to be complete.

use crate::core::error::InterceptError;
use crate::core::store::validate_tool_name;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to an executable's path to form its stash.
pub const STASH_SUFFIX: &str = "-intercepted";

/// Where the stashed original of `path` lives.
pub fn stash_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(STASH_SUFFIX);
    PathBuf::from(raw)
}

/// Ordered list of directories searched for executables.
#[derive(Debug, Clone)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Every file named `name` the current user may execute, in search order.
    ///
    /// Several entries that reach the same file (an aliased directory such as `/bin` ->
    /// `/usr/bin`, or a symlink in one directory pointing at the tool in another) count once.
    /// The real file is kept over a link to it. An empty result is not an error here.
    pub fn resolve(&self, name: &str) -> Result<Vec<PathBuf>, InterceptError> {
        self.scan(name, false)
    }

    /// Like [`SearchPath::resolve`], plus locations where only a stash survives.
    ///
    /// A transition interrupted after the original was stashed but before the wrapper was
    /// written leaves `<name>-intercepted` with nothing at `<name>`. Those locations still
    /// belong to the tool and must show up in its state.
    pub fn candidates(&self, name: &str) -> Result<Vec<PathBuf>, InterceptError> {
        self.scan(name, true)
    }

    /// Return the first executable named `name`, if any.
    pub fn first(&self, name: &str) -> Result<Option<PathBuf>, InterceptError> {
        validate_tool_name(name)?;
        let cwd = std::env::current_dir()?;
        let dirs = self.absolute_dirs(&cwd);
        if dirs.is_empty() {
            return Ok(None);
        }
        match which::which_in(name, Some(join_dirs(&dirs)?), &cwd) {
            Ok(path) => Ok(Some(path)),
            Err(which::Error::CannotFindBinaryPath) => Ok(None),
            Err(e) => Err(lookup_error(name, e)),
        }
    }

    fn scan(&self, name: &str, include_orphans: bool) -> Result<Vec<PathBuf>, InterceptError> {
        validate_tool_name(name)?;
        let cwd = std::env::current_dir()?;
        let dirs = self.absolute_dirs(&cwd);
        if dirs.is_empty() {
            return Ok(Vec::new());
        }
        let executables: HashSet<PathBuf> =
            match which::which_in_all(name, Some(join_dirs(&dirs)?), &cwd) {
                Ok(found) => found.collect(),
                Err(which::Error::CannotFindBinaryPath) => HashSet::new(),
                Err(e) => return Err(lookup_error(name, e)),
            };

        let mut found = Vec::new();
        for dir in dirs {
            let candidate = dir.join(name);
            if found.contains(&candidate) {
                continue;
            }
            let present = executables.contains(&candidate);
            let orphan_stash = include_orphans
                && fs::symlink_metadata(&candidate).is_err()
                && stash_path(&candidate).exists();
            if present || orphan_stash {
                found.push(candidate);
            }
        }
        Ok(merge_same_file(found))
    }

    fn absolute_dirs(&self, cwd: &Path) -> Vec<PathBuf> {
        self.dirs
            .iter()
            .filter(|d| !d.as_os_str().is_empty())
            .map(|d| if d.is_absolute() { d.clone() } else { cwd.join(d) })
            .collect()
    }
}

fn join_dirs(dirs: &[PathBuf]) -> Result<OsString, InterceptError> {
    std::env::join_paths(dirs)
        .map_err(|e| InterceptError::ValidationError(format!("invalid search path entry: {}", e)))
}

fn lookup_error(name: &str, err: which::Error) -> InterceptError {
    InterceptError::ValidationError(format!("cannot search for {}: {}", name, err))
}

/// Collapse locations that resolve to the same file, keeping search order.
///
/// Within a group the first location that is not itself a symbolic link wins, so wrapping it
/// also covers the links pointing at it.
fn merge_same_file(locations: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut groups: Vec<(PathBuf, PathBuf)> = Vec::new();
    for location in locations {
        let key = file_key(&location);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, kept)) => {
                if is_symlink(kept) && !is_symlink(&location) {
                    *kept = location;
                }
            }
            None => groups.push((key, location)),
        }
    }
    groups.into_iter().map(|(_, kept)| kept).collect()
}

/// Identity of the file at `location`; falls back to the canonical directory for locations
/// where nothing exists (orphaned stashes).
fn file_key(location: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(location) {
        return canonical;
    }
    match (location.parent(), location.file_name()) {
        (Some(dir), Some(name)) => fs::canonicalize(dir)
            .unwrap_or_else(|_| dir.to_path_buf())
            .join(name),
        _ => location.to_path_buf(),
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}
