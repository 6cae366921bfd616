//! # vgit-git
//!
//! Git capability layer for VGit, built on git2-rs.
//! Exposes the small set of object, ref and diff operations the
//! virtual branch engine consumes, behind the [`GitOps`] trait.

mod error;
mod remote;
mod repository;
mod traits;

pub use error::{Error, Result};
pub use git2::Oid;
pub use repository::{ChangeStatus, CommitInfo, PathChange, Repository, TreeOverride};
pub use traits::GitOps;

/// Hash bytes as a git blob without writing them to the object database.
///
/// # Errors
/// Returns error if libgit2 fails to hash the buffer.
pub fn hash_blob(data: &[u8]) -> Result<Oid> {
    Ok(Oid::hash_object(git2::ObjectType::Blob, data)?)
}
