//! Error types for vgit-core.

use std::path::PathBuf;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vgit-core operations.
///
/// Every variant carries the identifiers (paths, branch names, hunk ids)
/// needed to act on it; nothing is reported as a bare string.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not inside a Git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepository,

    /// The .git/vgit directory doesn't exist.
    #[error("vgit not initialized in this repository - run `vgit init` first")]
    NotInitialized,

    /// `init` was run twice.
    #[error("vgit is already initialized in this repository")]
    AlreadyInitialized,

    /// A path in the working tree could not be read or diffed.
    #[error("cannot diff {path}: {reason}")]
    DiffFailure {
        /// Path relative to the repository root.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// Hunk is owned by another branch; it must be unclaimed first.
    #[error("hunk {hunk} in {path} is already claimed by '{owner}'")]
    HunkAlreadyClaimed {
        /// Hunk id (short form).
        hunk: String,
        /// Path of the hunk.
        path: String,
        /// Branch currently holding the hunk.
        owner: String,
    },

    /// No hunk matches the given id.
    #[error("no hunk matches '{0}'")]
    UnknownHunk(String),

    /// Hunk belongs to an unapplied branch and is not in the working tree.
    #[error("hunk {hunk} belongs to unapplied branch '{branch}' - apply it first")]
    HunkNotInWorkingTree {
        /// Hunk id (short form).
        hunk: String,
        /// Owning branch.
        branch: String,
    },

    /// Branch does not exist.
    #[error("unknown virtual branch: {0}")]
    UnknownBranch(String),

    /// Branch name already taken.
    #[error("a virtual branch named '{0}' already exists")]
    DuplicateName(String),

    /// Invalid branch name.
    #[error("invalid branch name '{name}': {reason}")]
    InvalidBranchName {
        /// The invalid name.
        name: String,
        /// Why the name is invalid.
        reason: String,
    },

    /// Branch still owns hunks and deletion was not forced.
    #[error("branch '{name}' still claims {claimed} hunk(s) - use --force to release them")]
    BranchNotEmpty {
        /// Branch name.
        name: String,
        /// Number of claimed hunks.
        claimed: usize,
    },

    /// Branch is stashed; its hunks are not in the working tree.
    #[error("branch '{0}' is not applied - run `vgit apply {0}` first")]
    BranchNotApplied(String),

    /// No branch was named and none is selected.
    #[error("no virtual branch selected - pass a branch name or run `vgit switch <name>`")]
    NoBranchSelected,

    /// A path or line selector could not be parsed or matched nothing.
    #[error("invalid selector '{input}': {reason}")]
    InvalidSelector {
        /// The selector as given.
        input: String,
        /// Why it is invalid.
        reason: String,
    },

    /// Branch changes do not apply cleanly to the current files.
    #[error("cannot apply '{branch}': conflicts in {}", paths.join(", "))]
    ApplyConflict {
        /// Branch being applied.
        branch: String,
        /// Conflicting paths.
        paths: Vec<String>,
    },

    /// Branch changes can no longer be isolated from the working tree.
    #[error("cannot unapply '{branch}': changes were modified in {}", paths.join(", "))]
    UnapplyConflict {
        /// Branch being unapplied.
        branch: String,
        /// Paths whose branch hunks are no longer present.
        paths: Vec<String>,
    },

    /// Nothing to commit on the branch.
    #[error("nothing to commit on '{branch}': {reason}")]
    EmptyCommit {
        /// Branch name.
        branch: String,
        /// Why the commit would be empty.
        reason: String,
    },

    /// Remote diverged from the branch.
    #[error("push of '{branch}' rejected: {target} has diverged - pull or push with --force")]
    NonFastForward {
        /// Branch name.
        branch: String,
        /// Remote ref that rejected the update.
        target: String,
    },

    /// Another vgit process holds the repository lock.
    #[error("repository is busy: lock held by pid {holder} ({})", path.display())]
    RepositoryBusy {
        /// PID recorded in the lock file, or "unknown".
        holder: String,
        /// Lock file path.
        path: PathBuf,
    },

    /// Persisted state failed to load or failed invariant checks.
    #[error("corrupt vgit state in {}: {reason} - inspect the file; vgit will not repair it", file.display())]
    CorruptState {
        /// File that failed.
        file: PathBuf,
        /// Which invariant broke.
        reason: String,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Git operation error.
    #[error("git error: {0}")]
    Git(#[from] vgit_git::Error),
}

impl Error {
    /// Whether the error is one of the conflict kinds that leave files untouched.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ApplyConflict { .. } | Self::UnapplyConflict { .. }
        )
    }
}
