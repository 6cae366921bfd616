//! Error types for vgit-git.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during git operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not inside a git repository.
    #[error("not a git repository")]
    NotARepository,

    /// Repository has no working directory.
    #[error("bare repositories are not supported")]
    BareRepository,

    /// Reference not found.
    #[error("reference not found: {0}")]
    RefNotFound(String),

    /// Revision could not be resolved to a commit.
    #[error("cannot resolve revision '{0}' to a commit")]
    BadRevision(String),

    /// Compare-and-swap on a reference lost the race or found an unexpected value.
    #[error("reference {name} was modified concurrently (expected {expected})")]
    RefConflict {
        /// Full reference name.
        name: String,
        /// The value the writer expected, or "absent".
        expected: String,
    },

    /// Remote rejected the push because it is not a fast-forward.
    #[error("push of {0} rejected: remote has diverged (non-fast-forward)")]
    NonFastForward(String),

    /// Remote not found.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// Push failed for a reason other than divergence.
    #[error("push failed: {0}")]
    PushFailed(String),

    /// Underlying git2 error.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),
}
