//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - catalog: show the cached catalog
//! - add/remove/priority: edit the grab queue
//! - list/status: inspect the queue
//! - clear-completed/reset-failed: queue housekeeping
//! - run: grab now, or at a wall-clock time

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// seatgrab - scheduled course seat grabber
#[derive(Parser, Debug)]
#[command(name = "seatgrab")]
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
    /// Show the cached catalog, marking queued entries
    Catalog,

    /// Queue a catalog entry for grabbing
    Add {
        /// Catalog id of the resource
        id: u64,

        /// Priority, lower runs first
        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        priority: i32,
    },

    /// Remove a task from the queue
    Remove {
        /// Resource id to remove
        id: u64,
    },

    /// Change the priority of a queued task
    Priority {
        /// Resource id to update
        id: u64,

        /// New priority, lower runs first
        #[arg(allow_negative_numbers = true)]
        priority: i32,
    },

    /// List queued tasks in execution order
    List {
        /// Show only pending tasks
        #[arg(short, long)]
        pending: bool,
    },

    /// Show queue counts
    Status,

    /// Drop tasks that were grabbed successfully
    ClearCompleted,

    /// Put failed tasks back to pending
    ResetFailed,

    /// Start grabbing, now or at a given time
    Run {
        /// Local wall-clock start time, "YYYY-MM-DD HH:MM[:SS]"
        #[arg(short, long)]
        at: Option<String>,

        /// Seconds between attempts (0.1 to 60)
        #[arg(short, long)]
        interval: Option<f64>,
    },
}
