//! Command definitions and dispatch.

use clap::{Parser, Subcommand};
use clap_complete::Shell;

pub mod add;
pub mod apply;
pub mod branch;
pub mod commit;
pub mod completions;
pub mod delete;
pub mod init;
pub mod log;
pub mod push;
pub mod recover;
pub mod status;
pub mod unclaim;
pub mod utils;

/// Virtual branches over a single git working directory.
///
/// Split the changes in your working tree into several independent
/// branches, then stash, commit and push each one on its own.
#[derive(Debug, Parser)]
#[command(name = "vgit", version, about, long_about = None)]
#[command(propagate_version = true, arg_required_else_help = true)]
pub struct Cli {
    /// Show debug logging on stderr (overridden by VGIT_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress informational output.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start tracking virtual branches in this repository.
    Init {
        /// Base commit the branches build on (default: HEAD).
        #[arg(long)]
        base: Option<String>,
    },

    /// Create a virtual branch, or list branches when no name is given.
    #[command(visible_alias = "b")]
    Branch {
        /// Name of the new branch.
        name: Option<String>,
    },

    /// List virtual branches in stack order.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Make a branch the default target for add, commit and push.
    Switch {
        /// Branch to select.
        name: String,
    },

    /// Rename a virtual branch.
    Rename {
        /// Current name.
        old: String,
        /// New name.
        new: String,
    },

    /// Move a branch to a new position in the stack (0 is first).
    Reorder {
        /// Branch to move.
        name: String,
        /// Target position.
        position: usize,
    },

    /// Delete a virtual branch; its changes stay in the working tree.
    Delete {
        /// Branch to delete.
        name: String,
        /// Delete even if the branch still claims hunks.
        #[arg(short, long)]
        force: bool,
    },

    /// Claim hunks for a branch.
    #[command(visible_alias = "a")]
    Add {
        /// Paths, directories, `path:N` or `path:N..M` (default: everything).
        selectors: Vec<String>,
        /// Select hunks by id or id prefix.
        #[arg(long = "hunk", value_name = "ID")]
        hunks: Vec<String>,
        /// Branch to claim into (created if missing; default: selected).
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Return hunks to the unclaimed pool.
    #[command(visible_alias = "u", alias = "unstage")]
    Unclaim {
        /// Paths, directories, `path:N` or `path:N..M`.
        #[arg(required_unless_present_any = ["all", "hunks"])]
        selectors: Vec<String>,
        /// Select hunks by id or id prefix.
        #[arg(long = "hunk", value_name = "ID")]
        hunks: Vec<String>,
        /// Unclaim every hunk in the working tree.
        #[arg(long, conflicts_with_all = ["selectors", "hunks"])]
        all: bool,
    },

    /// Show branches, their hunks, and unclaimed changes.
    #[command(visible_alias = "s")]
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Put a stashed branch's changes back into the working tree.
    Apply {
        /// Branch to apply.
        name: String,
    },

    /// Take a branch's changes out of the working tree.
    Unapply {
        /// Branch to stash.
        name: String,
    },

    /// Commit a branch's hunks without touching the working tree.
    #[command(visible_alias = "c")]
    Commit {
        /// Commit message.
        #[arg(short, long)]
        message: String,
        /// Branch to commit (default: selected).
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Publish a branch's commits to the remote.
    #[command(visible_alias = "p")]
    Push {
        /// Branch to push (default: selected).
        branch: Option<String>,
        /// Remote to push to (default: general.default_remote).
        #[arg(short, long)]
        remote: Option<String>,
        /// Overwrite the remote branch if it diverged (uses --force-with-lease).
        #[arg(short, long)]
        force: bool,
        /// Delete the branch after a successful push.
        #[arg(long)]
        integrated: bool,
        /// Skip the confirmation for --integrated.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show a branch's commits.
    #[command(visible_alias = "l")]
    Log {
        /// Branch to show (default: selected).
        branch: Option<String>,
        /// Limit the number of commits.
        #[arg(short = 'n', long = "max-count")]
        max_count: Option<usize>,
        /// One line per commit.
        #[arg(long)]
        oneline: bool,
    },

    /// Roll back an interrupted apply or unapply.
    Recover,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}
