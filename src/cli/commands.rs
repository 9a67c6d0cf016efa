//! CLI command definitions using clap.
//!
//! Subcommands operate on the run journal, the safety classifier and the
//! plugin directory:
//! - runs / status / incomplete / recover: inspect and repair run history
//! - classify: show the heuristic tier of an action
//! - plugins / invoke: list and exercise plugin tools

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// deskloop - observe-think-act core for a desktop agent
#[derive(Parser, Debug)]
#[command(name = "deskloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List persisted runs with their terminal state
    Runs,

    /// Show the replayed status of one run
    Status {
        /// Run ID
        run_id: String,
    },

    /// List runs that never reached a terminal event
    Incomplete,

    /// Mark every incomplete run abandoned
    Recover {
        /// Reason recorded in the journal
        #[arg(short, long, default_value = "abandoned by operator")]
        reason: String,
    },

    /// Print the heuristic risk tier of an action
    Classify {
        /// Tool name
        tool: String,

        /// Tool parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },

    /// List discovered plugins and their tools
    Plugins,

    /// Dispatch one tool call through the safety gate
    Invoke {
        /// Tool name
        tool: String,

        /// Tool parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,

        /// Approve confirmations without prompting
        #[arg(short, long)]
        yes: bool,
    },
}
