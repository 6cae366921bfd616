//! # vgit-core
//!
//! Virtual branch engine for VGit.
//!
//! Several named virtual branches share one working directory. Every change
//! in the working tree is split into hunks, each hunk is claimed by at most
//! one branch, and each branch can be stashed, re-applied, committed and
//! pushed on its own without touching the others.
//!
//! [`Workspace`] is the entry point; the other modules are the pieces it is
//! built from.

pub mod apply;
pub mod branch;
pub mod branch_name;
pub mod config;
pub mod error;
pub mod hunk;
pub mod index;
pub mod lock;
pub mod ownership;
pub mod reconcile;
pub mod selector;
pub mod state;
pub mod traits;
pub mod workspace;

#[cfg(test)]
mod test_support;

pub use branch::{ApplyState, BranchStore, VirtualBranch};
pub use branch_name::BranchName;
pub use config::Config;
pub use error::{Error, Result};
pub use hunk::{Hunk, HunkId, HunkKind};
pub use ownership::{OwnershipMap, ReconcileReport};
pub use reconcile::{CommitOutcome, PushOutcome};
pub use selector::Selector;
pub use state::{State, Store};
pub use traits::StateStore;
pub use workspace::{
    ApplyReport, BranchStatus, ClaimReport, DeleteReport, PushReport, Status, Workspace,
};
