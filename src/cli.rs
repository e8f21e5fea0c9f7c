//! CLI definitions for the deskhand binary.

use clap::{Parser, Subcommand};

/// Deskhand CLI.
#[derive(Parser)]
#[command(name = "deskhand")]
#[command(about = "Natural-language desktop automation agent")]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Execute one natural-language command against the desktop
    Run {
        /// The command, e.g. "open chrome and go to github.com"
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,

        /// Approve confirmation prompts automatically
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Parse a command into a structured intent without executing it
    Intent {
        /// The command to interpret
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Check that the browser and accessibility surfaces are reachable
    Check,
}
