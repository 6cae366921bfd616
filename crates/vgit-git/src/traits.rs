//! Trait abstraction over the git capabilities the engine consumes.
//!
//! The virtual branch engine never talks to libgit2 directly; everything
//! goes through [`GitOps`] so the capability boundary stays explicit.

use std::path::Path;

use git2::Oid;

use crate::{CommitInfo, PathChange, Result, TreeOverride};

/// Git object, ref and diff operations used by the virtual branch engine.
///
/// Note: operations are synchronous since git2 is a synchronous library.
#[allow(clippy::missing_errors_doc)]
pub trait GitOps {
    // === Repository Info ===

    /// Get the working directory path.
    fn workdir(&self) -> Option<&Path>;

    /// Get the path to the .git directory.
    fn git_dir(&self) -> &Path;

    /// Resolve a revision (branch, tag, sha, `HEAD`) to a commit.
    fn resolve_commit(&self, rev: &str) -> Result<Oid>;

    // === Objects ===

    /// Get the tree id of a commit.
    fn read_tree(&self, commit: Oid) -> Result<Oid>;

    /// Look up the blob stored at `path` in a tree, if any.
    fn tree_entry(&self, tree: Oid, path: &str) -> Result<Option<(Oid, bool)>>;

    /// Read a blob's content.
    fn read_blob(&self, blob: Oid) -> Result<Vec<u8>>;

    /// Write bytes to the object database as a blob.
    fn write_blob(&self, data: &[u8]) -> Result<Oid>;

    /// Write a tree that is `base` with the given paths replaced or removed.
    fn write_tree(&self, base: Oid, overrides: &[TreeOverride]) -> Result<Oid>;

    /// Create a commit object without moving any reference.
    fn create_commit(&self, tree: Oid, parents: &[Oid], message: &str) -> Result<Oid>;

    /// Paths that differ between a tree and the working directory.
    fn diff_paths(&self, tree: Oid) -> Result<Vec<PathChange>>;

    // === History ===

    /// Commits reachable from `to` but not from `from`, newest first.
    fn commits_between(&self, from: Oid, to: Oid) -> Result<Vec<Oid>>;

    /// Summary information for a commit.
    fn commit_info(&self, commit: Oid) -> Result<CommitInfo>;

    /// Check if `ancestor` is reachable from `descendant`.
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool>;

    // === References ===

    /// Read a reference, returning `None` when it does not exist.
    fn read_ref(&self, name: &str) -> Result<Option<Oid>>;

    /// Write a reference with compare-and-swap semantics.
    ///
    /// `expected_old` of `None` means the reference must not exist yet.
    fn write_ref(&self, name: &str, target: Oid, expected_old: Option<Oid>) -> Result<()>;

    // === Remote Operations ===

    /// Push a local reference to `remote_ref` on `remote`.
    fn push(&self, local_ref: &str, remote: &str, remote_ref: &str, force: bool) -> Result<()>;
}
