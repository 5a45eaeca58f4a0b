//! Operator-facing status lines.
//!
//! Success and information go to stdout; warnings and failures go to stderr so that scripts
//! capturing stdout only see results.

use colored::Colorize;

pub fn success(msg: &str) {
    println!("{} {}", "✓".bright_green(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", "ℹ".bright_blue(), msg);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "⚠".bright_yellow(), msg);
}

pub fn failure(msg: &str) {
    eprintln!("{} {}", "✗".bright_red(), msg);
}

/// Indented follow-up line under a status line, typically a command to run.
pub fn detail(msg: &str) {
    println!("  {} {}", "▸".bright_cyan(), msg);
}

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}
