//! Rule sets and their on-disk documents.
//!
//! A rule set says how to rewrite the arguments of one tool. It is stored as a small JSON
//! document named after the tool inside the [`Store`] directory:
//!
//! ```json
//! {
//!   "drop": ["-v"],
//!   "append": ["--safe"],
//!   "prepend": [],
//!   "replace": [["--colour", "--color"]],
//!   "announce": false,
//!   "notify": false
//! }
//! ```
//!
//! Missing keys default to empty/false and unknown keys are ignored. Documents written by older
//! releases are migrated on load, see [`crate::core::migration::migrate_legacy_keys`].

use crate::core::error::InterceptError;
use crate::core::migration::migrate_legacy_keys;
use crate::core::store::{Store, resolve_link_chain};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Argument rewrite configuration for one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Removed (first occurrence) when present.
    pub drop: Vec<String>,
    /// Added at the end when absent.
    pub append: Vec<String>,
    /// Added at the front when absent, keeping declaration order.
    pub prepend: Vec<String>,
    /// `(from, to)`: first occurrence of `from` becomes `to`.
    pub replace: Vec<(String, String)>,
    /// Print the final command line before running.
    pub announce: bool,
    /// Print every rewrite action as it is applied.
    pub notify: bool,
}

/// A rule set plus any compatibility notices produced while reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedRules {
    pub rules: RuleSet,
    pub notices: Vec<String>,
}

/// What [`ensure_rules`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesPresence {
    Existing,
    Created,
    Invalid(String),
}

impl RuleSet {
    /// Parse a rule document, migrating legacy keys.
    pub fn from_json_str(tool: &str, content: &str) -> Result<LoadedRules, InterceptError> {
        let invalid = |reason: String| InterceptError::InvalidFormat {
            name: tool.to_string(),
            reason,
        };
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;
        let serde_json::Value::Object(mut doc) = value else {
            return Err(invalid("expected a JSON object".to_string()));
        };
        let notices = migrate_legacy_keys(&mut doc);
        let rules = serde_json::from_value(serde_json::Value::Object(doc))
            .map_err(|e| invalid(e.to_string()))?;
        Ok(LoadedRules { rules, notices })
    }

    /// Canonical document text. Equal rule sets always produce identical bytes.
    pub fn to_json_string(&self) -> Result<String, InterceptError> {
        let mut out = serde_json::to_string_pretty(self).map_err(|e| {
            InterceptError::ValidationError(format!("cannot serialize rules: {}", e))
        })?;
        out.push('\n');
        Ok(out)
    }

    pub fn add_drop(&mut self, arg: &str) -> bool {
        push_unique(&mut self.drop, arg)
    }

    pub fn add_append(&mut self, arg: &str) -> bool {
        push_unique(&mut self.append, arg)
    }

    pub fn add_prepend(&mut self, arg: &str) -> bool {
        push_unique(&mut self.prepend, arg)
    }

    pub fn add_replace(&mut self, from: &str, to: &str) -> bool {
        let pair = (from.to_string(), to.to_string());
        if self.replace.contains(&pair) {
            return false;
        }
        self.replace.push(pair);
        true
    }
}

/// A single operator edit to a rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEdit {
    Append(String),
    Prepend(String),
    Drop(String),
    Replace(String, String),
    Announce(bool),
    Notify(bool),
}

impl RuleEdit {
    /// Apply to `rules`. Returns `false` when the rule set already said this.
    pub fn apply(&self, rules: &mut RuleSet) -> bool {
        match self {
            RuleEdit::Append(arg) => rules.add_append(arg),
            RuleEdit::Prepend(arg) => rules.add_prepend(arg),
            RuleEdit::Drop(arg) => rules.add_drop(arg),
            RuleEdit::Replace(from, to) => rules.add_replace(from, to),
            RuleEdit::Announce(on) => std::mem::replace(&mut rules.announce, *on) != *on,
            RuleEdit::Notify(on) => std::mem::replace(&mut rules.notify, *on) != *on,
        }
    }

    /// Journal operation name.
    pub fn op(&self) -> &'static str {
        match self {
            RuleEdit::Append(_) => "rules.append",
            RuleEdit::Prepend(_) => "rules.prepend",
            RuleEdit::Drop(_) => "rules.disable",
            RuleEdit::Replace(..) => "rules.replace",
            RuleEdit::Announce(true) => "rules.display",
            RuleEdit::Announce(false) => "rules.hide",
            RuleEdit::Notify(true) => "rules.notify",
            RuleEdit::Notify(false) => "rules.unnotify",
        }
    }
}

/// Load, edit and save the rules for `tool` in one step. Returns whether anything changed.
pub fn edit_rules(store: &Store, tool: &str, edit: &RuleEdit) -> Result<bool, InterceptError> {
    let mut rules = load_rules_for(store, tool)?;
    let changed = edit.apply(&mut rules);
    if changed {
        save_rules(store, tool, &rules)?;
    }
    Ok(changed)
}

fn push_unique(list: &mut Vec<String>, arg: &str) -> bool {
    if list.iter().any(|a| a == arg) {
        return false;
    }
    list.push(arg.to_string());
    true
}

/// Load the rules for `tool`, discarding compatibility notices.
pub fn load_rules_for(store: &Store, tool: &str) -> Result<RuleSet, InterceptError> {
    Ok(load_rules(store, tool)?.rules)
}

/// Load the rules for `tool`.
///
/// `NotFound` when there is no document (or the document is a dangling link), `InvalidFormat`
/// when it does not parse as a rule set.
pub fn load_rules(store: &Store, tool: &str) -> Result<LoadedRules, InterceptError> {
    let content = read_raw(store, tool)?;
    RuleSet::from_json_str(tool, &content)
}

/// The rule document exactly as stored.
pub fn read_raw(store: &Store, tool: &str) -> Result<String, InterceptError> {
    let path = store.rules_path(tool)?;
    match fs::read_to_string(&path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(InterceptError::NotFound(format!(
            "Configuration for {} does not exist",
            tool
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Persist `rules` for `tool`.
///
/// When the document is a symbolic link the link's target is rewritten and the link itself is
/// left alone, so tools sharing a configuration keep sharing it.
pub fn save_rules(store: &Store, tool: &str, rules: &RuleSet) -> Result<(), InterceptError> {
    let path = store.rules_path(tool)?;
    let target = resolve_link_chain(&path)?;
    write_atomic(&target, rules.to_json_string()?.as_bytes())
}

/// Create a default rule set for `tool` unless one is already there.
pub fn ensure_rules(store: &Store, tool: &str) -> Result<RulesPresence, InterceptError> {
    match load_rules(store, tool) {
        Ok(_) => Ok(RulesPresence::Existing),
        Err(InterceptError::NotFound(_)) => {
            save_rules(store, tool, &RuleSet::default())?;
            Ok(RulesPresence::Created)
        }
        Err(InterceptError::InvalidFormat { reason, .. }) => Ok(RulesPresence::Invalid(reason)),
        Err(e) => Err(e),
    }
}

/// Replace whatever is stored for `tool` (file or link) with an independent default document.
///
/// Returns the previous link target when the document used to be a link.
pub fn reset_rules(store: &Store, tool: &str) -> Result<Option<PathBuf>, InterceptError> {
    let path = store.rules_path(tool)?;
    let previous_link = store.link_target(tool)?;
    remove_if_present(&path)?;
    save_rules(store, tool, &RuleSet::default())?;
    Ok(previous_link)
}

/// Make `other` read its rules from `tool`'s document.
///
/// Refuses to build chains (when `tool`'s own document is already a link) unless `force` is set.
pub fn link_rules(
    store: &Store,
    tool: &str,
    other: &str,
    force: bool,
) -> Result<(), InterceptError> {
    if tool == other {
        return Err(InterceptError::ValidationError(format!(
            "cannot link {} to itself",
            tool
        )));
    }
    let source = store.rules_path(tool)?;
    let target = store.rules_path(other)?;
    if !store.has_rules(tool)? {
        return Err(InterceptError::NotFound(format!(
            "Configuration for {} does not exist",
            tool
        )));
    }
    if store.link_target(tool)?.is_some() && !force {
        return Err(InterceptError::ValidationError(format!(
            "Refusing to link, since {} is already a symlink (use --force to link anyway)",
            tool
        )));
    }
    if resolve_link_chain(&source)? == target {
        return Err(InterceptError::ValidationError(format!(
            "{} already reads its configuration from {}",
            tool, other
        )));
    }
    remove_if_present(&target)?;
    symlink_file(Path::new(tool), &target)
}

/// Give `other` an independent copy of `tool`'s current rules.
pub fn copy_rules(store: &Store, tool: &str, other: &str) -> Result<(), InterceptError> {
    if tool == other {
        return Err(InterceptError::ValidationError(format!(
            "cannot copy {} onto itself",
            tool
        )));
    }
    let content = read_raw(store, tool)?;
    let target = store.rules_path(other)?;
    // Renaming over a link replaces the link, which is the point.
    write_atomic(&target, content.as_bytes())
}

fn remove_if_present(path: &Path) -> Result<(), InterceptError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write to a sibling temp file, then rename into place.
fn write_atomic(target: &Path, data: &[u8]) -> Result<(), InterceptError> {
    let file_name = target
        .file_name()
        .ok_or_else(|| {
            InterceptError::ValidationError(format!("{} has no file name", target.display()))
        })?
        .to_string_lossy();
    let tmp = target.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(unix)]
fn symlink_file(original: &Path, link: &Path) -> Result<(), InterceptError> {
    std::os::unix::fs::symlink(original, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn symlink_file(original: &Path, link: &Path) -> Result<(), InterceptError> {
    let source = link.with_file_name(original);
    std::os::windows::fs::symlink_file(source, link)?;
    Ok(())
}
