//! The argument rewrite pipeline.
//!
//! Stages run in a fixed order: drop, append, prepend, replace. Each stage tests membership
//! against the argument list as left by the previous one, so the order is part of the contract.
//! Matching is exact string equality.

use crate::core::rules::RuleSet;
use std::path::Path;

/// Result of running the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// `[program, ...rewritten arguments]`
    pub argv: Vec<String>,
    /// One line per applied action, in order. Empty unless `notify` is set.
    pub notes: Vec<String>,
    /// Final command line, when `announce` is set.
    pub announcement: Option<String>,
}

/// Rewrite `argv` according to `rules`. `argv[0]` is the program and is never touched.
///
/// An empty `argv` comes back empty.
pub fn rewrite(argv: &[String], rules: &RuleSet) -> Rewrite {
    let Some((program, tail)) = argv.split_first() else {
        return Rewrite {
            argv: Vec::new(),
            notes: Vec::new(),
            announcement: None,
        };
    };
    let name = program_name(program);
    let mut args: Vec<String> = tail.to_vec();
    let mut notes = Vec::new();
    let mut note = |line: String| {
        if rules.notify {
            notes.push(line);
        }
    };

    for arg in &rules.drop {
        if let Some(idx) = args.iter().position(|a| a == arg) {
            args.remove(idx);
            note(format!("{}: dropping {}", name, arg));
        }
    }

    for arg in &rules.append {
        if !args.contains(arg) {
            args.push(arg.clone());
            note(format!("{}: appending {}", name, arg));
        }
    }

    for arg in rules.prepend.iter().rev() {
        if !args.contains(arg) {
            args.insert(0, arg.clone());
            note(format!("{}: prepending {}", name, arg));
        }
    }

    for (from, to) in &rules.replace {
        if let Some(idx) = args.iter().position(|a| a == from) {
            args[idx] = to.clone();
            note(format!("{}: replacing {} with {}", name, from, to));
        }
    }

    let announcement = rules
        .announce
        .then(|| format!("{} {}", name, args.join(" ")).trim_end().to_string());

    let mut out = Vec::with_capacity(args.len() + 1);
    out.push(program.clone());
    out.extend(args);
    Rewrite {
        argv: out,
        notes,
        announcement,
    }
}

/// Rewrite and return only the argument vector.
pub fn rewrite_args(argv: &[String], rules: &RuleSet) -> Vec<String> {
    rewrite(argv, rules).argv
}

fn program_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string())
}
