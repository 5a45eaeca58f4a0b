//! intercept: transparent argument rewriting for installed executables.
//!
//! `intercept curl` moves every `curl` found on the search path aside (to `curl-intercepted`)
//! and installs a small wrapper in its place. From then on each invocation of `curl` goes
//! through the wrapper, which loads curl's rule set, rewrites the arguments and execs the real
//! binary. `intercept undo curl` puts the original back.
//!
//! # Architecture
//!
//! - [`core::resolver`](crate::core::resolver): find every location of a command name
//! - [`core::rules`](crate::core::rules): rule sets and their JSON documents (one per tool, symlinks allowed)
//! - [`core::rewrite`](crate::core::rewrite): the pure argument rewrite pipeline
//! - [`core::interception`](crate::core::interception): per-path state detection and the intercept/undo transitions
//! - [`core::wrapper`](crate::core::wrapper): wrapper stub generation and detection
//! - [`core::launch`](crate::core::launch): what a wrapper does at run time
//!
//! # Examples
//!
//! ```bash
//! # Wrap curl, then make it always quiet and never verbose
//! intercept curl
//! intercept append curl --silent
//! intercept disable curl -v
//!
//! # Inspect and restore
//! intercept status curl
//! intercept undo curl
//! ```

mod cli;
pub mod core;

use crate::cli::{Cli, Command, RunWrappedCli};
use crate::core::error::InterceptError;
use crate::core::journal;
use crate::core::interception::{
    InterceptOptions, Interceptor, PathState, ToolState, TransitionReport, inconsistency_error,
};
use crate::core::launch::{LaunchRequest, exec_replace, launch};
use crate::core::migration::INTERCEPT_VERSION;
use crate::core::output;
use crate::core::resolver::SearchPath;
use crate::core::rules::{self, RuleEdit, RuleSet, RulesPresence};
use crate::core::settings::Settings;
use crate::core::store::Store;

use clap::{CommandFactory, Parser};
use std::io::Read;
use std::path::Path;

/// Everything a command needs, resolved once per invocation.
struct Context {
    settings: Settings,
    store: Store,
    search: SearchPath,
    opts: InterceptOptions,
}

impl Context {
    fn interceptor(&self) -> Interceptor<'_> {
        Interceptor::new(&self.store, &self.search, self.settings.interpreter.clone())
    }

    /// Create the rule directory on first use.
    fn prepare_store(&self) -> Result<(), InterceptError> {
        if !self.store.root.is_dir() {
            output::info(&format!(
                "{} does not exist, creating...",
                self.store.root.display()
            ));
            self.store.ensure_root()?;
        }
        Ok(())
    }

    /// Rule commands act on intercepted tools only, unless forced.
    fn require_intercepted(&self, tool: &str) -> Result<(), InterceptError> {
        if self.opts.force {
            return Ok(());
        }
        self.interceptor().require_intercepted(tool)
    }

    fn journal(&self, op: &str, tool: &str) {
        if let Err(e) = journal::record(&self.store, op, tool, None, "success") {
            output::warn(&format!("could not write journal: {}", e));
        }
    }
}

pub fn run() -> Result<(), InterceptError> {
    let cli = Cli::parse();
    let settings = Settings::from_env(cli.config_dir.clone())?;
    let ctx = Context {
        store: Store::new(settings.config_dir.clone()),
        search: SearchPath::new(settings.search_path.clone()),
        opts: InterceptOptions { force: cli.force },
        settings,
    };

    let command = match (cli.command, cli.tool) {
        (Some(command), _) => command,
        (None, Some(tool)) => Command::Intercept { tool },
        (None, None) => {
            Cli::command().print_help()?;
            println!();
            return Ok(());
        }
    };

    match command {
        Command::Intercept { tool } => cmd_intercept(&ctx, &tool),
        Command::Undo { tool } => cmd_undo(&ctx, &tool),
        Command::Status { tool } => cmd_status(&ctx, &tool),
        Command::Configure { tool } => cmd_configure(&ctx, &tool),
        Command::Show { tool } => {
            ctx.require_intercepted(&tool)?;
            print!("{}", rules::read_raw(&ctx.store, &tool)?);
            Ok(())
        }
        Command::Edit { tool } => cmd_edit(&ctx, &tool),
        Command::Append { tool, arg } => cmd_rule_edit(&ctx, &tool, RuleEdit::Append(arg)),
        Command::Prepend { tool, arg } => cmd_rule_edit(&ctx, &tool, RuleEdit::Prepend(arg)),
        Command::Disable { tool, arg } => cmd_rule_edit(&ctx, &tool, RuleEdit::Drop(arg)),
        Command::Replace { tool, from, to } => {
            cmd_rule_edit(&ctx, &tool, RuleEdit::Replace(from, to))
        }
        Command::Display { tool } => cmd_rule_edit(&ctx, &tool, RuleEdit::Announce(true)),
        Command::Hide { tool } => cmd_rule_edit(&ctx, &tool, RuleEdit::Announce(false)),
        Command::Notify { tool } => cmd_rule_edit(&ctx, &tool, RuleEdit::Notify(true)),
        Command::Unnotify { tool } => cmd_rule_edit(&ctx, &tool, RuleEdit::Notify(false)),
        Command::Link { tool, other } => cmd_link(&ctx, &tool, &other),
        Command::Copy { tool, other } => cmd_copy(&ctx, &tool, &other),
        Command::Reset { tool } => cmd_reset(&ctx, &tool),
        Command::Check { tool } => cmd_check(&ctx, &tool),
        Command::Version => {
            println!("v{}", INTERCEPT_VERSION);
            Ok(())
        }
        Command::RunWrapped(args) => cmd_run_wrapped(&ctx, args),
    }
}

/// Print an error and its corrective hint to stderr.
pub fn report_error(err: &InterceptError) {
    output::failure(&format!("Error: {}", err));
    if let Some(hint) = err.hint() {
        eprintln!("  {}", hint);
    }
}

fn cmd_intercept(ctx: &Context, tool: &str) -> Result<(), InterceptError> {
    ctx.prepare_store()?;
    let report = ctx.interceptor().intercept_tool(tool, ctx.opts)?;
    for path in &report.changed {
        output::success(&format!("Successfully intercepted {}", path.display()));
    }
    match &report.rules {
        Some(RulesPresence::Created) => output::info(&format!(
            "Configuration for {} not found, created a fresh one",
            tool
        )),
        Some(RulesPresence::Invalid(reason)) => output::warn(&format!(
            "Configuration for {} exists, but is invalid ({}). Usage of {} will be impossible until this is fixed",
            tool,
            output::compact_line(reason, 120),
            tool
        )),
        _ => {}
    }
    finish_transition(report)
}

fn cmd_undo(ctx: &Context, tool: &str) -> Result<(), InterceptError> {
    let report = ctx.interceptor().undo_tool(tool, ctx.opts)?;
    for path in &report.changed {
        output::success(&format!("Successfully unintercepted {}", path.display()));
    }
    if report.is_success() {
        output::info(&format!(
            "Unintercepted {}, leaving the configuration in place",
            tool
        ));
    }
    finish_transition(report)
}

/// Print skips and failures of a transition, each failure once with its hint.
fn finish_transition(report: TransitionReport) -> Result<(), InterceptError> {
    for (path, why) in &report.skipped {
        output::info(&format!("{}: {}, skipping", path.display(), why));
    }
    for warning in &report.warnings {
        output::warn(warning);
    }
    for (path, err) in &report.failures {
        output::failure(&format!("{}: {}", path.display(), err));
        if let Some(hint) = err.hint() {
            output::detail(&hint);
        }
    }
    if report.failures.is_empty() {
        return Ok(());
    }
    Err(InterceptError::TransitionIncomplete {
        tool: report.tool,
        failed: report.failures.len(),
    })
}

fn cmd_status(ctx: &Context, tool: &str) -> Result<(), InterceptError> {
    let record = ctx.interceptor().record(tool)?;
    match record.state() {
        ToolState::NotIntercepted => output::info(&format!("{} is NOT intercepted", tool)),
        ToolState::FullyIntercepted => output::success(&format!("{} is intercepted", tool)),
        ToolState::PartiallyIntercepted => {
            output::warn(&format!("{} is partially intercepted", tool));
            output::detail(&format!("To clean this up, call: intercept {} --force", tool));
        }
    }
    for entry in &record.paths {
        println!("  {}: {}", entry.path.display(), entry.state.describe());
    }
    for entry in record.inconsistent() {
        if let PathState::Inconsistent(kind) = entry.state {
            let err = inconsistency_error(&entry.path, kind);
            output::warn(&err.to_string());
            if let Some(hint) = err.hint() {
                output::detail(&hint);
            }
        }
    }

    if record.state() == ToolState::NotIntercepted && !ctx.store.has_rules(tool)? {
        return Ok(());
    }
    match rules::load_rules(&ctx.store, tool) {
        Ok(loaded) => {
            match ctx.store.link_target(tool)? {
                Some(target) => output::info(&format!(
                    "{} is scheduled to read configuration from {}",
                    tool,
                    link_display_name(&target)
                )),
                None => output::info(&format!("{} has its own configuration", tool)),
            }
            for notice in &loaded.notices {
                output::warn(&format!(
                    "{} (run `intercept check {}` to update the file)",
                    notice, tool
                ));
            }
        }
        Err(InterceptError::NotFound(_)) => {
            output::warn(&format!("{} has no configuration", tool));
            output::detail(&format!("Create one with: intercept reset {}", tool));
        }
        Err(e @ InterceptError::InvalidFormat { .. }) => {
            output::warn(&e.to_string());
            if let Some(hint) = e.hint() {
                output::detail(&hint);
            }
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

fn link_display_name(target: &Path) -> String {
    target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| target.display().to_string())
}

fn cmd_configure(ctx: &Context, tool: &str) -> Result<(), InterceptError> {
    ctx.require_intercepted(tool)?;
    ctx.prepare_store()?;
    let mut data = String::new();
    std::io::stdin().read_to_string(&mut data)?;
    let loaded = RuleSet::from_json_str(tool, &data)?;
    for notice in &loaded.notices {
        output::warn(notice);
    }
    rules::save_rules(&ctx.store, tool, &loaded.rules)?;
    ctx.journal("rules.configure", tool);
    output::success("Configuration successfully written");
    Ok(())
}

fn cmd_edit(ctx: &Context, tool: &str) -> Result<(), InterceptError> {
    ctx.require_intercepted(tool)?;
    let file = ctx.store.rules_path(tool)?;
    let configured = std::env::var("VISUAL")
        .ok()
        .or_else(|| std::env::var("EDITOR").ok())
        .or_else(|| ctx.settings.editor.clone())
        .filter(|e| !e.trim().is_empty());

    let mut argv: Vec<String> = match configured {
        Some(editor) => editor.split_whitespace().map(str::to_string).collect(),
        None => {
            let found = match ctx.search.first("nano")? {
                Some(p) => Some(p),
                None => ctx.search.first("vi")?,
            };
            let Some(path) = found else {
                return Err(InterceptError::NotFound(
                    "no editor found; set $EDITOR or `editor` in the settings file".to_string(),
                ));
            };
            vec![path.to_string_lossy().into_owned()]
        }
    };
    argv.push(file.to_string_lossy().into_owned());
    let program = argv[0].clone();
    Err(exec_replace(Path::new(&program), &argv))
}

fn cmd_rule_edit(ctx: &Context, tool: &str, edit: RuleEdit) -> Result<(), InterceptError> {
    ctx.require_intercepted(tool)?;
    if rules::edit_rules(&ctx.store, tool, &edit)? {
        ctx.journal(edit.op(), tool);
        output::success("Configuration changed");
    } else {
        output::info("Configuration already says that, nothing changed");
    }
    Ok(())
}

fn cmd_link(ctx: &Context, tool: &str, other: &str) -> Result<(), InterceptError> {
    ctx.require_intercepted(tool)?;
    ctx.require_intercepted(other)?;
    rules::link_rules(&ctx.store, tool, other, ctx.opts.force)?;
    ctx.journal("rules.link", other);
    output::success(&format!("Linked {} to read from {}'s config", other, tool));
    Ok(())
}

fn cmd_copy(ctx: &Context, tool: &str, other: &str) -> Result<(), InterceptError> {
    ctx.require_intercepted(tool)?;
    ctx.require_intercepted(other)?;
    rules::copy_rules(&ctx.store, tool, other)?;
    ctx.journal("rules.copy", other);
    output::success(&format!("Copied {}'s config onto {}", tool, other));
    Ok(())
}

fn cmd_reset(ctx: &Context, tool: &str) -> Result<(), InterceptError> {
    ctx.require_intercepted(tool)?;
    ctx.prepare_store()?;
    if let Some(target) = rules::reset_rules(&ctx.store, tool)? {
        output::info(&format!(
            "{} config was a symlink to {}",
            tool,
            link_display_name(&target)
        ));
    }
    ctx.journal("rules.reset", tool);
    output::success("Configuration reset");
    Ok(())
}

fn cmd_check(ctx: &Context, tool: &str) -> Result<(), InterceptError> {
    ctx.require_intercepted(tool)?;
    let loaded = rules::load_rules(&ctx.store, tool)?;
    for notice in &loaded.notices {
        output::info(&format!("migrated: {}", notice));
    }
    rules::save_rules(&ctx.store, tool, &loaded.rules)?;
    ctx.journal("rules.check", tool);
    output::success("Configuration is valid");
    Ok(())
}

fn cmd_run_wrapped(ctx: &Context, args: RunWrappedCli) -> Result<(), InterceptError> {
    let req = LaunchRequest {
        tool: args.tool,
        stash: args.stash,
        wrapper_version: args.wrapper_version,
        argv: args.argv,
    };
    Err(launch(&ctx.store, &req))
}
