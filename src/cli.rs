//! CLI struct definitions for the intercept command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "intercept",
    version = env!("CARGO_PKG_VERSION"),
    about = "Wrap an installed executable so every invocation passes through an argument-rewrite layer.",
    after_help = "Use --force if you need a command to complete despite being told it cannot. \
Locations that are already intercepted are never intercepted again, since that would overwrite \
the stashed original."
)]
pub(crate) struct Cli {
    /// Tool to intercept (`intercept curl` is the same as `intercept intercept curl`).
    pub tool: Option<String>,

    #[clap(subcommand)]
    pub command: Option<Command>,

    /// Proceed past refusals such as partial interception. Safety checks still apply.
    #[clap(long, global = true)]
    pub force: bool,

    /// Directory holding rule files (default: /etc/interceptor.d).
    #[clap(long, global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Wrap every location of a tool
    Intercept { tool: String },

    /// Restore the original executable, leaving the configuration in place
    Undo { tool: String },

    /// Show interception state and configuration details
    Status { tool: String },

    /// Replace the configuration with JSON read from stdin (end with Ctrl+D)
    Configure { tool: String },

    /// Print the configuration
    Show { tool: String },

    /// Open the configuration in an editor
    Edit { tool: String },

    /// Append ARG to the command line whenever the tool runs
    Append {
        tool: String,
        #[clap(allow_hyphen_values = true)]
        arg: String,
    },

    /// Prepend ARG to the command line whenever the tool runs
    Prepend {
        tool: String,
        #[clap(allow_hyphen_values = true)]
        arg: String,
    },

    /// Remove ARG from the command line whenever the tool runs
    Disable {
        tool: String,
        #[clap(allow_hyphen_values = true)]
        arg: String,
    },

    /// Replace FROM with TO whenever it is passed to the tool
    Replace {
        tool: String,
        #[clap(allow_hyphen_values = true)]
        from: String,
        #[clap(allow_hyphen_values = true)]
        to: String,
    },

    /// Print the final command line before the tool starts
    Display { tool: String },

    /// Stop printing the final command line
    Hide { tool: String },

    /// Print a line for every argument action taken
    Notify { tool: String },

    /// Stop printing argument actions
    Unnotify { tool: String },

    /// Make OTHER read its configuration from TOOL's (symlink)
    Link { tool: String, other: String },

    /// Copy TOOL's configuration onto OTHER's
    Copy { tool: String, other: String },

    /// Delete the configuration and create a fresh one
    Reset { tool: String },

    /// Validate the configuration and rewrite it in canonical form
    Check { tool: String },

    /// Show version information
    Version,

    /// Entry point for generated wrappers
    #[clap(hide = true)]
    RunWrapped(RunWrappedCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct RunWrappedCli {
    #[clap(long)]
    pub tool: String,
    /// Location of the stashed original.
    #[clap(long)]
    pub stash: PathBuf,
    /// Version embedded in the wrapper; empty for pre-versioning wrappers.
    #[clap(long, default_value = "")]
    pub wrapper_version: String,
    /// Received argument vector, argv[0] first.
    #[clap(last = true, allow_hyphen_values = true)]
    pub argv: Vec<String>,
}
