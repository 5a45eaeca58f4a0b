#![cfg(unix)]

use intercept::core::error::{InterceptError, Transition};
use intercept::core::interception::{
    InterceptOptions, Interceptor, PathState, ToolState, intercept_path,
};
use intercept::core::journal;
use intercept::core::resolver::{SearchPath, stash_path};
use intercept::core::rewrite::rewrite;
use intercept::core::rules::{self, RuleEdit, RuleSet, RulesPresence};
use intercept::core::store::Store;
use intercept::core::wrapper::is_wrapper;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const ORIGINAL: &str = "#!/bin/sh\nprintf '%s\\n' \"$@\"\n";

fn install_tool(dir: &Path, name: &str, mode: u32) -> PathBuf {
    fs::create_dir_all(dir).expect("mkdir bin");
    let path = dir.join(name);
    fs::write(&path, ORIGINAL).expect("write tool");
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod tool");
    path
}

fn mode_of(path: &Path) -> u32 {
    fs::metadata(path).expect("metadata").permissions().mode() & 0o7777
}

struct Fixture {
    _tmp: tempfile::TempDir,
    store: Store,
    search: SearchPath,
    bins: Vec<PathBuf>,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempdir().expect("tempdir");
        let bins = vec![tmp.path().join("usr-local-bin"), tmp.path().join("usr-bin")];
        for dir in &bins {
            fs::create_dir_all(dir).expect("mkdir bin");
        }
        let store = Store::new(tmp.path().join("interceptor.d"));
        store.ensure_root().expect("store root");
        Self {
            search: SearchPath::new(bins.clone()),
            store,
            bins,
            _tmp: tmp,
        }
    }

    fn interceptor(&self) -> Interceptor<'_> {
        Interceptor::new(
            &self.store,
            &self.search,
            PathBuf::from("/usr/local/bin/intercept"),
        )
    }
}

#[test]
fn intercept_then_undo_restores_bytes_and_mode() {
    let fx = Fixture::new();
    let a = install_tool(&fx.bins[0], "mytool", 0o750);
    let b = install_tool(&fx.bins[1], "mytool", 0o755);

    let report = fx
        .interceptor()
        .intercept_tool("mytool", InterceptOptions::default())
        .expect("intercept");
    assert!(report.is_success());
    assert_eq!(report.changed, vec![a.clone(), b.clone()]);
    assert_eq!(report.rules, Some(RulesPresence::Created));

    for path in [&a, &b] {
        assert!(is_wrapper(path).expect("sniff"));
        assert_eq!(fs::read_to_string(stash_path(path)).expect("stash"), ORIGINAL);
    }
    assert_eq!(mode_of(&a), 0o750);
    assert_eq!(mode_of(&b), 0o755);
    assert_eq!(
        fx.interceptor().tool_state("mytool").expect("state"),
        ToolState::FullyIntercepted
    );
    assert_eq!(
        rules::load_rules_for(&fx.store, "mytool").expect("rules"),
        RuleSet::default()
    );

    let report = fx
        .interceptor()
        .undo_tool("mytool", InterceptOptions::default())
        .expect("undo");
    assert!(report.is_success());
    for path in [&a, &b] {
        assert_eq!(fs::read_to_string(path).expect("restored"), ORIGINAL);
        assert!(!stash_path(path).exists());
    }
    assert_eq!(mode_of(&a), 0o750);
    assert_eq!(mode_of(&b), 0o755);
    assert_eq!(
        fx.interceptor().tool_state("mytool").expect("state"),
        ToolState::NotIntercepted
    );
    // Undo leaves the configuration alone.
    assert!(fx.store.has_rules("mytool").expect("has rules"));
}

#[test]
fn second_intercept_is_refused_without_touching_anything() {
    let fx = Fixture::new();
    let path = install_tool(&fx.bins[0], "mytool", 0o755);
    fx.interceptor()
        .intercept_tool("mytool", InterceptOptions::default())
        .expect("first intercept");
    let wrapper_before = fs::read(&path).expect("wrapper");
    let stash_before = fs::read(stash_path(&path)).expect("stash");

    for force in [false, true] {
        let err = fx
            .interceptor()
            .intercept_tool("mytool", InterceptOptions { force })
            .expect_err("second intercept must fail");
        assert!(matches!(err, InterceptError::AlreadyIntercepted(_)));
    }

    assert_eq!(fs::read(&path).expect("wrapper"), wrapper_before);
    assert_eq!(fs::read(stash_path(&path)).expect("stash"), stash_before);
}

#[test]
fn partial_interception_needs_force() {
    let fx = Fixture::new();
    let a = install_tool(&fx.bins[0], "mytool", 0o755);
    let b = install_tool(&fx.bins[1], "mytool", 0o755);
    let interceptor = fx.interceptor();
    intercept_path(&a, &interceptor.wrapper_spec("mytool", &a)).expect("wrap one path");

    let record = interceptor.record("mytool").expect("record");
    assert_eq!(record.state(), ToolState::PartiallyIntercepted);
    assert_eq!(record.paths[0].state, PathState::Intercepted);
    assert_eq!(record.paths[1].state, PathState::Original);

    let err = interceptor
        .intercept_tool("mytool", InterceptOptions::default())
        .expect_err("partial without force");
    assert!(matches!(
        err,
        InterceptError::PartiallyIntercepted {
            op: Transition::Intercept,
            ..
        }
    ));
    assert_eq!(fs::read_to_string(&b).expect("untouched"), ORIGINAL);

    let err = interceptor
        .undo_tool("mytool", InterceptOptions::default())
        .expect_err("partial undo without force");
    assert!(matches!(
        err,
        InterceptError::PartiallyIntercepted {
            op: Transition::Undo,
            ..
        }
    ));

    let report = interceptor
        .intercept_tool("mytool", InterceptOptions { force: true })
        .expect("forced intercept");
    assert_eq!(report.changed, vec![b.clone()]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, a);
    assert_eq!(
        interceptor.tool_state("mytool").expect("state"),
        ToolState::FullyIntercepted
    );
}

#[test]
fn missing_stash_is_reported_not_repaired() {
    let fx = Fixture::new();
    let path = install_tool(&fx.bins[0], "mytool", 0o755);
    fx.interceptor()
        .intercept_tool("mytool", InterceptOptions::default())
        .expect("intercept");
    fs::remove_file(stash_path(&path)).expect("lose the stash");
    let wrapper = fs::read(&path).expect("wrapper");

    let report = fx
        .interceptor()
        .undo_tool("mytool", InterceptOptions { force: true })
        .expect("undo runs");
    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].1.hint().is_some());
    assert_eq!(fs::read(&path).expect("wrapper kept"), wrapper);
}

#[test]
fn unknown_tool_is_not_found() {
    let fx = Fixture::new();
    let err = fx
        .interceptor()
        .intercept_tool("does-not-exist", InterceptOptions::default())
        .expect_err("nothing to intercept");
    assert!(matches!(err, InterceptError::NotFound(_)));
    assert!(!fx.store.has_rules("does-not-exist").expect("has rules"));
}

#[test]
fn existing_rules_survive_interception() {
    let fx = Fixture::new();
    install_tool(&fx.bins[0], "mytool", 0o755);
    let mut custom = RuleSet::default();
    custom.add_append("--quiet");
    rules::save_rules(&fx.store, "mytool", &custom).expect("save");

    let report = fx
        .interceptor()
        .intercept_tool("mytool", InterceptOptions::default())
        .expect("intercept");
    assert_eq!(report.rules, Some(RulesPresence::Existing));
    assert_eq!(rules::load_rules_for(&fx.store, "mytool").expect("rules"), custom);
}

#[test]
fn linked_tools_share_edits() {
    let fx = Fixture::new();
    rules::save_rules(&fx.store, "vim", &RuleSet::default()).expect("save vim");
    rules::save_rules(&fx.store, "vi", &RuleSet::default()).expect("save vi");
    rules::link_rules(&fx.store, "vim", "vi", false).expect("link");

    assert!(rules::edit_rules(&fx.store, "vi", &RuleEdit::Append("-n".into())).expect("edit"));
    let vim = rules::load_rules_for(&fx.store, "vim").expect("vim rules");
    assert_eq!(vim.append, vec!["-n".to_string()]);
    assert!(fx.store.link_target("vi").expect("link").is_some());

    let argv: Vec<String> = ["vi", "notes.txt"].iter().map(|s| s.to_string()).collect();
    let out = rewrite(&argv, &rules::load_rules_for(&fx.store, "vi").expect("vi rules"));
    assert_eq!(out.argv, vec!["vi", "notes.txt", "-n"]);
}

#[test]
fn transitions_are_journaled() {
    let fx = Fixture::new();
    let path = install_tool(&fx.bins[0], "mytool", 0o755);
    let interceptor = fx.interceptor();
    interceptor
        .intercept_tool("mytool", InterceptOptions::default())
        .expect("intercept");
    interceptor
        .undo_tool("mytool", InterceptOptions::default())
        .expect("undo");

    let events = journal::read_events(&fx.store).expect("events");
    let ops: Vec<&str> = events.iter().map(|e| e.op.as_str()).collect();
    assert_eq!(ops, vec!["intercept.path", "undo.path"]);
    let expected = path.to_string_lossy().into_owned();
    for ev in &events {
        assert_eq!(ev.tool, "mytool");
        assert_eq!(ev.status, "success");
        assert_eq!(ev.path.as_deref(), Some(expected.as_str()));
        assert!(ev.ts.ends_with('Z'));
    }
}

#[test]
fn symlinked_duplicate_location_is_wrapped_once() {
    let fx = Fixture::new();
    let real = install_tool(&fx.bins[1], "greet", 0o755);
    let link = fx.bins[0].join("greet");
    std::os::unix::fs::symlink(&real, &link).expect("symlink");

    let record = fx.interceptor().record("greet").expect("record");
    assert_eq!(record.paths.len(), 1);
    assert_eq!(record.paths[0].path, real);

    let report = fx
        .interceptor()
        .intercept_tool("greet", InterceptOptions::default())
        .expect("intercept");
    assert!(report.is_success());
    assert_eq!(report.changed, vec![real.clone()]);
    assert!(
        fs::symlink_metadata(&link)
            .expect("link")
            .file_type()
            .is_symlink()
    );
    assert!(fs::symlink_metadata(stash_path(&link)).is_err());
    assert_eq!(
        fx.interceptor().tool_state("greet").expect("state"),
        ToolState::FullyIntercepted
    );

    fx.interceptor()
        .undo_tool("greet", InterceptOptions::default())
        .expect("undo");
    assert_eq!(fs::read_to_string(&link).expect("through link"), ORIGINAL);
}

#[test]
fn forced_intercept_never_touches_inconsistent_locations() {
    let fx = Fixture::new();
    // StashOrphaned: original present, stale stash next to it.
    let orphaned = install_tool(&fx.bins[0], "mytool", 0o755);
    fs::write(stash_path(&orphaned), "#!/bin/sh\necho stale\n").expect("stale stash");
    // WrapperMissing: only the stash is left.
    let missing = fx.bins[1].join("mytool");
    fs::write(stash_path(&missing), "#!/bin/sh\necho lone\n").expect("lone stash");

    let record = fx.interceptor().record("mytool").expect("record");
    assert_eq!(record.paths.len(), 2);
    assert_eq!(record.inconsistent().count(), 2);

    let report = fx
        .interceptor()
        .intercept_tool("mytool", InterceptOptions { force: true })
        .expect("forced intercept runs");
    assert!(!report.is_success());
    assert!(report.changed.is_empty());
    let failed: Vec<&PathBuf> = report.failures.iter().map(|(p, _)| p).collect();
    assert_eq!(failed, vec![&orphaned, &missing]);
    for (_, err) in &report.failures {
        assert!(err.hint().is_some());
    }

    assert_eq!(fs::read_to_string(&orphaned).expect("original"), ORIGINAL);
    assert_eq!(
        fs::read_to_string(stash_path(&orphaned)).expect("stale stash"),
        "#!/bin/sh\necho stale\n"
    );
    assert_eq!(
        fs::read_to_string(stash_path(&missing)).expect("lone stash"),
        "#!/bin/sh\necho lone\n"
    );
    assert!(fs::symlink_metadata(&missing).is_err());
}

#[test]
fn rule_file_failure_keeps_the_transition_report() {
    let fx = Fixture::new();
    let path = install_tool(&fx.bins[0], "mytool", 0o755);
    fs::remove_dir(&fx.store.root).expect("drop rule dir");

    let report = fx
        .interceptor()
        .intercept_tool("mytool", InterceptOptions::default())
        .expect("report is returned");
    assert_eq!(report.changed, vec![path.clone()]);
    assert!(report.rules.is_none());
    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, fx.store.root.join("mytool"));
    assert!(is_wrapper(&path).expect("sniff"));
}

#[test]
fn the_wrapper_shell_is_never_intercepted() {
    let fx = Fixture::new();
    let sh = fx.bins[0].join("sh");
    std::os::unix::fs::symlink("/bin/sh", &sh).expect("symlink sh");

    let err = fx
        .interceptor()
        .intercept_tool("sh", InterceptOptions { force: true })
        .expect_err("sh must be refused");
    assert!(matches!(err, InterceptError::ValidationError(_)));
    assert!(
        fs::symlink_metadata(&sh)
            .expect("sh link")
            .file_type()
            .is_symlink()
    );
    assert!(fs::symlink_metadata(stash_path(&sh)).is_err());
}
