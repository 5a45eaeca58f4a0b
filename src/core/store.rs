//! The rule directory.
//!
//! One file per tool name lives directly under the store root. A file may be a symbolic link to
//! another tool's file, in which case both tools share one rule set.

use crate::core::error::InterceptError;
use std::fs;
use std::path::{Path, PathBuf};

/// Audit journal kept next to the rule files.
pub const JOURNAL_FILE: &str = ".intercept.events.jsonl";

/// Handle on the directory holding rule files.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the rule directory
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the rule directory if it is missing. Returns `true` when it was created.
    pub fn ensure_root(&self) -> Result<bool, InterceptError> {
        if self.root.is_dir() {
            return Ok(false);
        }
        fs::create_dir_all(&self.root)?;
        Ok(true)
    }

    /// Path of the rule file for `tool`. The file may not exist.
    pub fn rules_path(&self, tool: &str) -> Result<PathBuf, InterceptError> {
        validate_tool_name(tool)?;
        Ok(self.root.join(tool))
    }

    pub fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILE)
    }

    /// Whether a rule file (or a link, even a dangling one) exists for `tool`.
    pub fn has_rules(&self, tool: &str) -> Result<bool, InterceptError> {
        let path = self.rules_path(tool)?;
        Ok(fs::symlink_metadata(path).is_ok())
    }

    /// If the rule file for `tool` is a symbolic link, return where it points.
    pub fn link_target(&self, tool: &str) -> Result<Option<PathBuf>, InterceptError> {
        let path = self.rules_path(tool)?;
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_symlink() => Ok(Some(fs::read_link(&path)?)),
            _ => Ok(None),
        }
    }
}

/// Tool names become file names, so anything that could escape the directory is refused.
pub fn validate_tool_name(tool: &str) -> Result<(), InterceptError> {
    if tool.is_empty() || tool == "." || tool == ".." || tool.contains('/') || tool.contains('\0')
    {
        return Err(InterceptError::ValidationError(format!(
            "'{}' is not a valid tool name",
            tool.escape_debug()
        )));
    }
    Ok(())
}

/// Follow a chain of symbolic links to the file that actually holds the data.
///
/// Unlike `fs::canonicalize`, the final target does not have to exist.
pub fn resolve_link_chain(path: &Path) -> Result<PathBuf, InterceptError> {
    let mut current = path.to_path_buf();
    for _ in 0..32 {
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = fs::read_link(&current)?;
                current = match current.parent() {
                    Some(parent) if target.is_relative() => parent.join(target),
                    _ => target,
                };
            }
            _ => return Ok(current),
        }
    }
    Err(InterceptError::ValidationError(format!(
        "too many levels of symbolic links at {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_name_validation() {
        assert!(validate_tool_name("curl").is_ok());
        assert!(validate_tool_name("python3.11").is_ok());
        for bad in ["", ".", "..", "../etc/passwd", "a/b", "nul\0"] {
            assert!(
                matches!(
                    validate_tool_name(bad),
                    Err(InterceptError::ValidationError(_))
                ),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_ensure_root_reports_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path().join("rules.d"));
        assert!(store.ensure_root().unwrap());
        assert!(!store.ensure_root().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_link_chain_resolution() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("curl"), "{}").unwrap();
        std::os::unix::fs::symlink("curl", root.join("wget")).unwrap();
        std::os::unix::fs::symlink(root.join("wget"), root.join("http")).unwrap();

        assert_eq!(resolve_link_chain(&root.join("http")).unwrap(), root.join("curl"));
        assert_eq!(resolve_link_chain(&root.join("curl")).unwrap(), root.join("curl"));

        let store = Store::new(root);
        assert_eq!(
            store.link_target("wget").unwrap(),
            Some(PathBuf::from("curl"))
        );
        assert_eq!(store.link_target("curl").unwrap(), None);
    }
}
