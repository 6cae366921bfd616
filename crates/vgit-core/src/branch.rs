//! Virtual branch data model and the ordered branch store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vgit_git::Oid;

use crate::BranchName;
use crate::error::{Error, Result};
use crate::hunk::HunkId;

/// Whether a branch's hunks are present in the working tree.
///
/// `Applying` and `Unapplying` are only ever persisted while files are being
/// rewritten; seeing one at startup means an interrupted operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    /// Hunks are stashed in state, not on disk.
    #[serde(alias = "stashed")]
    Unapplied,
    /// Files are being written to add the branch's hunks.
    Applying,
    /// Hunks are in the working tree.
    #[default]
    #[serde(alias = "active")]
    Applied,
    /// Files are being written to remove the branch's hunks.
    Unapplying,
}

impl ApplyState {
    /// Whether the state is one of the two stable states.
    #[must_use]
    pub const fn is_stable(self) -> bool {
        matches!(self, Self::Applied | Self::Unapplied)
    }

    /// Stable state an interrupted transition rolls back to.
    #[must_use]
    pub const fn rollback(self) -> Self {
        match self {
            Self::Applying | Self::Unapplied => Self::Unapplied,
            Self::Unapplying | Self::Applied => Self::Applied,
        }
    }

    /// Transient state while moving toward `self`.
    #[must_use]
    pub const fn transition(self) -> Self {
        match self {
            Self::Applied | Self::Applying => Self::Applying,
            Self::Unapplied | Self::Unapplying => Self::Unapplying,
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unapplied => "unapplied",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Unapplying => "unapplying",
        }
    }
}

/// A named, ordered set of hunk claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualBranch {
    /// Branch name, also its published ref name.
    pub name: BranchName,

    /// Commit the branch builds on.
    pub base: String,

    /// Last commit made for the branch, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,

    /// Claimed hunks in claim order.
    #[serde(default)]
    pub hunks: Vec<HunkId>,

    /// Remote ref the branch was pushed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,

    /// Commit last published to `refs/heads/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed: Option<String>,

    /// Applied or stashed.
    #[serde(default)]
    pub status: ApplyState,

    /// Some claimed hunk was lost to an edit and needs re-claiming.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_attention: bool,

    /// When the branch was created.
    pub created_at: DateTime<Utc>,

    /// Last change to the branch.
    pub updated_at: DateTime<Utc>,
}

impl VirtualBranch {
    /// Create an applied, empty branch on `base`.
    #[must_use]
    pub fn new(name: BranchName, base: Oid) -> Self {
        let now = Utc::now();
        Self {
            name,
            base: base.to_string(),
            head: None,
            hunks: Vec::new(),
            upstream: None,
            pushed: None,
            status: ApplyState::Applied,
            needs_attention: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the branch's hunks are in the working tree.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.status == ApplyState::Applied
    }

    /// Base commit id.
    #[must_use]
    pub fn base_id(&self) -> Option<Oid> {
        Oid::from_str(&self.base).ok()
    }

    /// Head commit id.
    #[must_use]
    pub fn head_id(&self) -> Option<Oid> {
        self.head.as_deref().and_then(|h| Oid::from_str(h).ok())
    }

    /// Last published commit id.
    #[must_use]
    pub fn pushed_id(&self) -> Option<Oid> {
        self.pushed.as_deref().and_then(|h| Oid::from_str(h).ok())
    }

    /// Record a modification.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Virtual branches in stack order.
///
/// Position matters: earlier branches take precedence when insertions from
/// two branches land on the same line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchStore {
    branches: Vec<VirtualBranch>,
}

impl BranchStore {
    /// Create an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            branches: Vec::new(),
        }
    }

    /// Branches in stack order.
    #[must_use]
    pub fn all(&self) -> &[VirtualBranch] {
        &self.branches
    }

    /// Mutable access to every branch.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VirtualBranch> {
        self.branches.iter_mut()
    }

    /// Number of branches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// Whether there are no branches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Find a branch by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&VirtualBranch> {
        self.branches.iter().find(|b| b.name == name)
    }

    /// Find a branch by name (mutable).
    pub fn get_mut(&mut self, name: &str) -> Option<&mut VirtualBranch> {
        self.branches.iter_mut().find(|b| b.name == name)
    }

    /// Find a branch or fail with [`Error::UnknownBranch`].
    ///
    /// # Errors
    /// Returns error if no branch has that name.
    pub fn require(&self, name: &str) -> Result<&VirtualBranch> {
        self.get(name)
            .ok_or_else(|| Error::UnknownBranch(name.to_string()))
    }

    /// Mutable [`require`](Self::require).
    ///
    /// # Errors
    /// Returns error if no branch has that name.
    pub fn require_mut(&mut self, name: &str) -> Result<&mut VirtualBranch> {
        self.get_mut(name)
            .ok_or_else(|| Error::UnknownBranch(name.to_string()))
    }

    /// Stack position of a branch.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.branches.iter().position(|b| b.name == name)
    }

    /// Append a branch.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateName`] if the name is taken.
    pub fn create(&mut self, branch: VirtualBranch) -> Result<&mut VirtualBranch> {
        if self.get(&branch.name).is_some() {
            return Err(Error::DuplicateName(branch.name.to_string()));
        }
        self.branches.push(branch);
        let last = self.branches.len() - 1;
        Ok(&mut self.branches[last])
    }

    /// Remove a branch, returning it.
    pub fn remove(&mut self, name: &str) -> Option<VirtualBranch> {
        let pos = self.position(name)?;
        Some(self.branches.remove(pos))
    }

    /// Move a branch to `index`, clamped to the end of the stack.
    ///
    /// # Errors
    /// Returns [`Error::UnknownBranch`] if the branch does not exist.
    pub fn reorder(&mut self, name: &str, index: usize) -> Result<usize> {
        let pos = self
            .position(name)
            .ok_or_else(|| Error::UnknownBranch(name.to_string()))?;
        let branch = self.branches.remove(pos);
        let index = index.min(self.branches.len());
        self.branches.insert(index, branch);
        Ok(index)
    }

    /// Rename a branch in place.
    ///
    /// # Errors
    /// Returns [`Error::UnknownBranch`] or [`Error::DuplicateName`].
    pub fn rename(&mut self, from: &str, to: BranchName) -> Result<()> {
        if from != to.as_str() && self.get(&to).is_some() {
            return Err(Error::DuplicateName(to.to_string()));
        }
        let branch = self.require_mut(from)?;
        branch.name = to;
        branch.touch();
        Ok(())
    }

    /// First free `{prefix}-{n}` name.
    ///
    /// # Errors
    /// Returns error if the prefix makes an invalid branch name.
    pub fn next_implicit_name(&self, prefix: &str) -> Result<BranchName> {
        let mut n = self.branches.len() + 1;
        loop {
            let candidate = format!("{prefix}-{n}");
            if self.get(&candidate).is_none() {
                return BranchName::new(candidate);
            }
            n += 1;
        }
    }

    /// Stack rank of a branch, `usize::MAX` for unknown or unclaimed.
    #[must_use]
    pub fn rank(&self, name: Option<&BranchName>) -> usize {
        name.and_then(|n| self.position(n)).unwrap_or(usize::MAX)
    }
}
