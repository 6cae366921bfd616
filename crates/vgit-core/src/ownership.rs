//! Ownership map: which virtual branch claims each hunk.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::BranchName;
use crate::branch::{ApplyState, BranchStore};
use crate::error::{Error, Result};
use crate::hunk::{Hunk, HunkId};

/// Outcome of reconciling the map with a fresh working-tree diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Hunks seen for the first time.
    pub added: Vec<HunkId>,
    /// Hunks no longer in the working tree, with their former owner.
    pub dropped: Vec<(HunkId, Option<BranchName>)>,
    /// New hunks that replaced a claimed hunk and need re-triage.
    pub needs_attention: Vec<HunkId>,
}

impl ReconcileReport {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.dropped.is_empty()
    }

    /// Claimed hunks that were lost.
    pub fn lost_claims(&self) -> impl Iterator<Item = (&HunkId, &BranchName)> {
        self.dropped
            .iter()
            .filter_map(|(id, owner)| owner.as_ref().map(|o| (id, o)))
    }
}

/// Hunk records plus the hunk → branch assignment.
///
/// Every hunk of the current working-tree diff has a record here, claimed or
/// not. Records of hunks owned by stashed branches are kept as well; they are
/// the only copy of those changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipMap {
    #[serde(default)]
    hunks: BTreeMap<HunkId, Hunk>,

    #[serde(default)]
    owners: BTreeMap<HunkId, BranchName>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    attention: BTreeSet<HunkId>,
}

impl OwnershipMap {
    /// Create an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hunks: BTreeMap::new(),
            owners: BTreeMap::new(),
            attention: BTreeSet::new(),
        }
    }

    /// Look up a hunk record.
    #[must_use]
    pub fn hunk(&self, id: &HunkId) -> Option<&Hunk> {
        self.hunks.get(id)
    }

    /// All hunk records, ordered by path then base position.
    #[must_use]
    pub fn hunks(&self) -> Vec<&Hunk> {
        let mut all: Vec<&Hunk> = self.hunks.values().collect();
        all.sort_by(|a, b| (&a.path, a.old_start, &a.id).cmp(&(&b.path, b.old_start, &b.id)));
        all
    }

    /// Owner of a hunk, `None` when unclaimed.
    #[must_use]
    pub fn owner(&self, id: &HunkId) -> Option<&BranchName> {
        self.owners.get(id)
    }

    /// Hunks claimed by `branch`, ordered by path then base position.
    #[must_use]
    pub fn owned_by(&self, branch: &str) -> Vec<&Hunk> {
        self.hunks()
            .into_iter()
            .filter(|h| self.owners.get(&h.id).is_some_and(|o| o == branch))
            .collect()
    }

    /// Hunks nobody claims.
    #[must_use]
    pub fn unclaimed(&self) -> Vec<&Hunk> {
        self.hunks()
            .into_iter()
            .filter(|h| !self.owners.contains_key(&h.id))
            .collect()
    }

    /// Whether a hunk awaits re-triage.
    #[must_use]
    pub fn needs_attention(&self, id: &HunkId) -> bool {
        self.attention.contains(id)
    }

    /// Hunks awaiting re-triage.
    #[must_use]
    pub const fn attention(&self) -> &BTreeSet<HunkId> {
        &self.attention
    }

    /// Resolve a full id or unique id prefix.
    ///
    /// # Errors
    /// [`Error::UnknownHunk`] if nothing matches, [`Error::InvalidSelector`]
    /// if the prefix is ambiguous.
    pub fn resolve(&self, prefix: &str) -> Result<HunkId> {
        let matches: Vec<&HunkId> = self
            .hunks
            .keys()
            .filter(|id| id.matches_prefix(prefix))
            .collect();
        match matches.as_slice() {
            [one] => Ok((*one).clone()),
            [] => Err(Error::UnknownHunk(prefix.to_string())),
            _ => Err(Error::InvalidSelector {
                input: prefix.to_string(),
                reason: format!("ambiguous: matches {} hunks", matches.len()),
            }),
        }
    }

    /// Assign an unclaimed hunk to `branch`.
    ///
    /// Returns `false` when the hunk already belonged to `branch`.
    ///
    /// # Errors
    /// - [`Error::UnknownBranch`] if the branch does not exist
    /// - [`Error::BranchNotApplied`] if the branch is stashed
    /// - [`Error::UnknownHunk`] if the hunk is not in the map
    /// - [`Error::HunkAlreadyClaimed`] if another branch owns it, or a stashed
    ///   branch holds an overlapping hunk
    pub fn claim(&mut self, id: &HunkId, branch: &str, branches: &mut BranchStore) -> Result<bool> {
        let target = branches.require(branch)?;
        if !target.is_applied() {
            return Err(Error::BranchNotApplied(branch.to_string()));
        }
        let hunk = self
            .hunks
            .get(id)
            .ok_or_else(|| Error::UnknownHunk(id.to_string()))?;

        if let Some(owner) = self.owners.get(id) {
            if owner == branch {
                return Ok(false);
            }
            return Err(already_claimed(hunk, owner));
        }

        if let Some((_, owner)) = self.stashed_overlap(hunk, branches) {
            return Err(already_claimed(hunk, owner));
        }

        let name = target.name.clone();
        self.owners.insert(id.clone(), name.clone());
        self.attention.remove(id);

        let target = branches.require_mut(&name)?;
        target.hunks.push(id.clone());
        target.needs_attention = false;
        target.touch();
        debug!(hunk = %id, branch = %name, "claimed hunk");
        Ok(true)
    }

    /// Return a hunk to the unclaimed pool, yielding its former owner.
    ///
    /// # Errors
    /// [`Error::UnknownHunk`] if the hunk is not in the map,
    /// [`Error::HunkNotInWorkingTree`] if its owner is stashed.
    pub fn unclaim(&mut self, id: &HunkId, branches: &mut BranchStore) -> Result<Option<BranchName>> {
        if !self.hunks.contains_key(id) {
            return Err(Error::UnknownHunk(id.to_string()));
        }
        let Some(owner) = self.owners.get(id) else {
            return Ok(None);
        };
        if branches.get(owner).is_some_and(|b| !b.is_applied()) {
            return Err(Error::HunkNotInWorkingTree {
                hunk: id.short().to_string(),
                branch: owner.to_string(),
            });
        }

        let owner = self.owners.remove(id);
        if let Some(branch) = owner.as_ref().and_then(|o| branches.get_mut(o)) {
            branch.hunks.retain(|h| h != id);
            branch.touch();
        }
        debug!(hunk = %id, "unclaimed hunk");
        Ok(owner)
    }

    /// Unclaim every hunk of `branch`, returning their ids.
    pub fn release(&mut self, branch: &str, branches: &mut BranchStore) -> Vec<HunkId> {
        let released: Vec<HunkId> = self
            .owners
            .iter()
            .filter(|(_, o)| *o == branch)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &released {
            self.owners.remove(id);
        }
        if let Some(b) = branches.get_mut(branch) {
            b.hunks.clear();
            b.touch();
        }
        released
    }

    /// Point every claim of `from` at `to`.
    pub fn rename_owner(&mut self, from: &str, to: &BranchName) {
        for owner in self.owners.values_mut() {
            if owner == from {
                owner.clone_from(to);
            }
        }
    }

    /// Replace the working-tree hunks with a fresh diff.
    ///
    /// Records and claims of hunks whose id survived carry forward with their
    /// new positions. Hunks that vanished are dropped, except those owned by
    /// stashed branches. A new hunk touching a dropped claimed hunk is put on
    /// the attention list and its former owner is flagged.
    pub fn reconcile(&mut self, fresh: Vec<Hunk>, branches: &mut BranchStore) -> ReconcileReport {
        let fresh_ids: BTreeSet<HunkId> = fresh.iter().map(|h| h.id.clone()).collect();
        let exempt: BTreeSet<HunkId> = self
            .owners
            .iter()
            .filter(|(_, o)| branches.get(o).is_some_and(|b| b.status == ApplyState::Unapplied))
            .map(|(id, _)| id.clone())
            .collect();

        let mut report = ReconcileReport::default();
        let mut lost: Vec<(Hunk, BranchName)> = Vec::new();

        let stale: Vec<HunkId> = self
            .hunks
            .keys()
            .filter(|id| !fresh_ids.contains(*id) && !exempt.contains(*id))
            .cloned()
            .collect();
        for id in stale {
            let record = self.hunks.remove(&id);
            let owner = self.owners.remove(&id);
            self.attention.remove(&id);
            if let (Some(record), Some(owner)) = (record, owner.as_ref()) {
                if let Some(b) = branches.get_mut(owner) {
                    b.hunks.retain(|h| h != &id);
                    b.touch();
                }
                lost.push((record, owner.clone()));
            }
            report.dropped.push((id, owner));
        }

        for hunk in fresh {
            if !self.hunks.contains_key(&hunk.id) {
                report.added.push(hunk.id.clone());
                for (old, owner) in &lost {
                    if hunk.touches(old) {
                        self.attention.insert(hunk.id.clone());
                        report.needs_attention.push(hunk.id.clone());
                        if let Some(b) = branches.get_mut(owner) {
                            b.needs_attention = true;
                        }
                        break;
                    }
                }
            }
            self.hunks.insert(hunk.id.clone(), hunk);
        }

        if !report.needs_attention.is_empty() {
            info!(
                count = report.needs_attention.len(),
                "claimed hunks changed and need attention"
            );
        }
        report
    }

    /// Stashed-branch hunk overlapping `hunk`, with its owner.
    #[must_use]
    pub fn stashed_overlap<'a>(
        &'a self,
        hunk: &Hunk,
        branches: &BranchStore,
    ) -> Option<(&'a Hunk, &'a BranchName)> {
        self.owners.iter().find_map(|(id, owner)| {
            let stashed = branches.get(owner).is_some_and(|b| !b.is_applied());
            let other = self.hunks.get(id)?;
            (stashed && other.id != hunk.id && other.overlaps(hunk)).then_some((other, owner))
        })
    }

    /// Forget hunk records, e.g. after their branch was applied and the
    /// working tree took them over.
    pub fn forget(&mut self, ids: &[HunkId]) {
        for id in ids {
            self.hunks.remove(id);
            self.owners.remove(id);
            self.attention.remove(id);
        }
    }

    /// Insert a record claimed by `owner` without touching the branch list.
    pub(crate) fn restore(&mut self, hunk: Hunk, owner: Option<&BranchName>) {
        if let Some(owner) = owner {
            self.owners.insert(hunk.id.clone(), owner.clone());
        }
        self.hunks.insert(hunk.id.clone(), hunk);
    }

    /// Check the map against the branch store.
    ///
    /// # Errors
    /// Returns a description of the first broken invariant.
    pub fn validate(&self, branches: &BranchStore) -> std::result::Result<(), String> {
        for (id, hunk) in &self.hunks {
            if &hunk.id != id {
                return Err(format!("hunk record {id} carries id {}", hunk.id));
            }
        }

        for (id, owner) in &self.owners {
            if branches.get(owner).is_none() {
                return Err(format!("hunk {id} is owned by unknown branch '{owner}'"));
            }
            if !self.hunks.contains_key(id) {
                return Err(format!("claimed hunk {id} has no record"));
            }
        }

        let mut seen: BTreeMap<&HunkId, &str> = BTreeMap::new();
        for branch in branches.all() {
            for id in &branch.hunks {
                if let Some(other) = seen.insert(id, branch.name.as_str()) {
                    return Err(format!(
                        "hunk {id} is listed by both '{other}' and '{}'",
                        branch.name
                    ));
                }
                if self.owners.get(id) != Some(&branch.name) {
                    return Err(format!(
                        "branch '{}' lists hunk {id} but ownership disagrees",
                        branch.name
                    ));
                }
            }
        }
        if seen.len() != self.owners.len() {
            return Err("ownership lists hunks no branch claims".into());
        }

        let claimed: Vec<&Hunk> = self.owners.keys().filter_map(|id| self.hunks.get(id)).collect();
        for (i, a) in claimed.iter().enumerate() {
            if let Some(b) = claimed[i + 1..]
                .iter()
                .find(|b| a.base_blob == b.base_blob && a.overlaps(b))
            {
                return Err(format!(
                    "claimed hunks {} and {} overlap in {}",
                    a.id, b.id, a.path
                ));
            }
        }
        Ok(())
    }
}

fn already_claimed(hunk: &Hunk, owner: &BranchName) -> Error {
    Error::HunkAlreadyClaimed {
        hunk: hunk.id.short().to_string(),
        path: hunk.path.clone(),
        owner: owner.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::branch::VirtualBranch;
    use crate::hunk::{FileVersions, diff_file};
    use vgit_git::Oid;

    fn hunks(base: &str, current: &str) -> Vec<Hunk> {
        diff_file(
            &FileVersions {
                path: "a.txt",
                base_blob: Some(vgit_git::hash_blob(base.as_bytes()).unwrap()),
                base: Some(base.as_bytes()),
                current: Some(current.as_bytes()),
                executable: false,
            },
            8000,
        )
        .unwrap()
    }

    fn store(names: &[&str]) -> BranchStore {
        let mut store = BranchStore::new();
        for n in names {
            store
                .create(VirtualBranch::new(BranchName::new(*n).unwrap(), Oid::zero()))
                .unwrap();
        }
        store
    }

    const BASE: &str = "1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n";

    #[test]
    fn test_reconcile_then_claim_partitions() {
        let mut branches = store(&["feat-x", "feat-y"]);
        let mut map = OwnershipMap::new();
        let fresh = hunks(BASE, "one\n2\n3\n4\n5\n6\n7\n8\nnine\n10\n");
        let report = map.reconcile(fresh.clone(), &mut branches);
        assert_eq!(report.added.len(), 2);

        assert!(map.claim(&fresh[0].id, "feat-x", &mut branches).unwrap());
        assert!(map.claim(&fresh[1].id, "feat-y", &mut branches).unwrap());

        assert_eq!(map.owned_by("feat-x").len(), 1);
        assert_eq!(map.owned_by("feat-y").len(), 1);
        assert!(map.unclaimed().is_empty());
        assert_eq!(branches.get("feat-x").unwrap().hunks, vec![fresh[0].id.clone()]);
        map.validate(&branches).unwrap();
    }

    #[test]
    fn test_claim_errors() {
        let mut branches = store(&["feat-x", "feat-y"]);
        let mut map = OwnershipMap::new();
        let fresh = hunks(BASE, "one\n2\n3\n4\n5\n6\n7\n8\n9\n10\n");
        map.reconcile(fresh.clone(), &mut branches);
        let id = &fresh[0].id;

        map.claim(id, "feat-x", &mut branches).unwrap();
        assert!(!map.claim(id, "feat-x", &mut branches).unwrap());
        assert!(matches!(
            map.claim(id, "feat-y", &mut branches),
            Err(Error::HunkAlreadyClaimed { owner, .. }) if owner == "feat-x"
        ));
        assert!(matches!(
            map.claim(id, "nope", &mut branches),
            Err(Error::UnknownBranch(_))
        ));

        let bogus = HunkId::from_oid(Oid::zero());
        assert!(matches!(
            map.claim(&bogus, "feat-x", &mut branches),
            Err(Error::UnknownHunk(_))
        ));
    }

    #[test]
    fn test_unclaim() {
        let mut branches = store(&["feat-x"]);
        let mut map = OwnershipMap::new();
        let fresh = hunks(BASE, "one\n2\n3\n4\n5\n6\n7\n8\n9\n10\n");
        map.reconcile(fresh.clone(), &mut branches);
        map.claim(&fresh[0].id, "feat-x", &mut branches).unwrap();

        let owner = map.unclaim(&fresh[0].id, &mut branches).unwrap();
        assert_eq!(owner.unwrap(), "feat-x");
        assert!(branches.get("feat-x").unwrap().hunks.is_empty());
        assert_eq!(map.unclaimed().len(), 1);
    }

    #[test]
    fn test_reconcile_carries_claims_across_shifts() {
        let mut branches = store(&["feat-x"]);
        let mut map = OwnershipMap::new();
        let fresh = hunks(BASE, "1\n2\n3\n4\n5\n6\n7\n8\nnine\n10\n");
        map.reconcile(fresh.clone(), &mut branches);
        map.claim(&fresh[0].id, "feat-x", &mut branches).unwrap();

        // An unrelated insertion at the top shifts the claimed hunk.
        let shifted = hunks(BASE, "top\n1\n2\n3\n4\n5\n6\n7\n8\nnine\n10\n");
        let report = map.reconcile(shifted, &mut branches);

        assert_eq!(report.added.len(), 1);
        assert!(report.dropped.is_empty());
        assert!(report.needs_attention.is_empty());
        let kept = map.owned_by("feat-x");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, fresh[0].id);
        assert_eq!(kept[0].new_start, 9);
    }

    #[test]
    fn test_reconcile_flags_changed_claims() {
        let mut branches = store(&["feat-x"]);
        let mut map = OwnershipMap::new();
        let fresh = hunks(BASE, "1\n2\nthree\n4\n5\n6\n7\n8\n9\n10\n");
        map.reconcile(fresh.clone(), &mut branches);
        map.claim(&fresh[0].id, "feat-x", &mut branches).unwrap();

        let edited = hunks(BASE, "1\n2\nTHREE\n4\n5\n6\n7\n8\n9\n10\n");
        let report = map.reconcile(edited.clone(), &mut branches);

        assert_eq!(report.needs_attention, vec![edited[0].id.clone()]);
        assert_eq!(report.lost_claims().count(), 1);
        assert!(map.needs_attention(&edited[0].id));
        assert!(map.owner(&edited[0].id).is_none());
        assert!(branches.get("feat-x").unwrap().needs_attention);
        map.validate(&branches).unwrap();

        // Re-claiming clears the flags.
        map.claim(&edited[0].id, "feat-x", &mut branches).unwrap();
        assert!(!map.needs_attention(&edited[0].id));
        assert!(!branches.get("feat-x").unwrap().needs_attention);
    }

    #[test]
    fn test_stashed_hunks_survive_reconcile_and_block_claims() {
        let mut branches = store(&["feat-x", "feat-y"]);
        let mut map = OwnershipMap::new();
        let fresh = hunks(BASE, "1\n2\nthree\n4\n5\n6\n7\n8\n9\n10\n");
        map.reconcile(fresh.clone(), &mut branches);
        map.claim(&fresh[0].id, "feat-x", &mut branches).unwrap();
        branches.get_mut("feat-x").unwrap().status = ApplyState::Unapplied;

        // The working tree no longer has the change.
        let report = map.reconcile(Vec::new(), &mut branches);
        assert!(report.dropped.is_empty());
        assert_eq!(map.owned_by("feat-x").len(), 1);

        // An overlapping edit cannot be claimed elsewhere.
        let other = hunks(BASE, "1\n2\n3!\n4\n5\n6\n7\n8\n9\n10\n");
        map.reconcile(other.clone(), &mut branches);
        assert!(matches!(
            map.claim(&other[0].id, "feat-y", &mut branches),
            Err(Error::HunkAlreadyClaimed { owner, .. }) if owner == "feat-x"
        ));
        assert!(matches!(
            map.unclaim(&fresh[0].id, &mut branches),
            Err(Error::HunkNotInWorkingTree { .. })
        ));
        assert!(matches!(
            map.claim(&other[0].id, "feat-x", &mut branches),
            Err(Error::BranchNotApplied(_))
        ));
    }

    #[test]
    fn test_resolve_prefix() {
        let mut branches = store(&[]);
        let mut map = OwnershipMap::new();
        let fresh = hunks(BASE, "one\n2\n3\n4\n5\n6\n7\n8\n9\n10\n");
        map.reconcile(fresh.clone(), &mut branches);

        let id = &fresh[0].id;
        assert_eq!(&map.resolve(&id.as_str()[..10]).unwrap(), id);
        assert!(matches!(map.resolve("zzzz"), Err(Error::UnknownHunk(_))));
    }

    #[test]
    fn test_validate_detects_disagreement() {
        let mut branches = store(&["feat-x"]);
        let mut map = OwnershipMap::new();
        let fresh = hunks(BASE, "one\n2\n3\n4\n5\n6\n7\n8\n9\n10\n");
        map.reconcile(fresh.clone(), &mut branches);
        map.claim(&fresh[0].id, "feat-x", &mut branches).unwrap();

        branches.get_mut("feat-x").unwrap().hunks.clear();
        assert!(map.validate(&branches).is_err());
    }

    #[test]
    fn test_release_and_rename() {
        let mut branches = store(&["feat-x"]);
        let mut map = OwnershipMap::new();
        let fresh = hunks(BASE, "one\n2\n3\n4\n5\n6\n7\n8\nnine\n10\n");
        map.reconcile(fresh.clone(), &mut branches);
        map.claim(&fresh[0].id, "feat-x", &mut branches).unwrap();
        map.claim(&fresh[1].id, "feat-x", &mut branches).unwrap();

        let renamed = BranchName::new("feat-z").unwrap();
        branches.rename("feat-x", renamed.clone()).unwrap();
        map.rename_owner("feat-x", &renamed);
        map.validate(&branches).unwrap();

        let released = map.release("feat-z", &mut branches);
        assert_eq!(released.len(), 2);
        assert_eq!(map.unclaimed().len(), 2);
        map.validate(&branches).unwrap();
    }
}
