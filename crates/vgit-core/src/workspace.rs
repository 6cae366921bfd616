//! The workspace handle: one repository, its vgit state, and every
//! user-facing operation.
//!
//! Mutating operations run as a transaction: take the repository lock, load
//! the store, roll back any interrupted apply, re-index the working tree,
//! act, save. Nothing is saved when the action fails, so a rejected claim or
//! a conflicting apply leaves no partial state behind.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};
use vgit_git::{CommitInfo, GitOps, Oid, Repository};

use crate::BranchName;
use crate::apply::{materialize, plan_apply, plan_unapply, recover};
use crate::branch::VirtualBranch;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hunk::{Hunk, HunkId};
use crate::index::WorkingTreeSnapshot;
use crate::lock::RepoLock;
use crate::ownership::ReconcileReport;
use crate::reconcile::{self, CommitOutcome, PushOutcome};
use crate::selector::Selector;
use crate::state::{State, Store};
use crate::traits::StateStore;

/// A virtual branch with its hunks, as shown by `status` and `list`.
#[derive(Debug, Clone, Serialize)]
pub struct BranchStatus {
    /// The branch.
    #[serde(flatten)]
    pub branch: VirtualBranch,
    /// Its hunk records, by path then position.
    #[serde(rename = "hunk_records")]
    pub records: Vec<Hunk>,
    /// Whether it is the selected branch.
    pub selected: bool,
}

/// Snapshot of the whole workspace.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    /// Workspace base commit.
    pub base: String,
    /// Selected branch.
    pub selected: Option<BranchName>,
    /// Branches in stack order.
    pub branches: Vec<BranchStatus>,
    /// Hunks nobody claims.
    pub unclaimed: Vec<Hunk>,
    /// Hunks that replaced a claimed hunk and need re-triage.
    pub attention: BTreeSet<HunkId>,
    /// An apply or unapply was interrupted and will be rolled back by the
    /// next mutating command.
    pub interrupted: bool,
}

/// Result of `claim`.
#[derive(Debug, Clone)]
pub struct ClaimReport {
    /// Branch that received the hunks.
    pub branch: BranchName,
    /// Whether the branch was created by this claim.
    pub created: bool,
    /// Newly claimed hunks.
    pub claimed: Vec<Hunk>,
    /// Matched hunks the branch already owned.
    pub already_owned: usize,
    /// Matched hunks left alone because another branch owns them.
    pub skipped: Vec<(Hunk, BranchName)>,
}

/// Result of `delete`.
#[derive(Debug, Clone)]
pub struct DeleteReport {
    /// Deleted branch.
    pub branch: BranchName,
    /// Hunks returned to the unclaimed pool.
    pub released: usize,
    /// Whether the branch was stashed and had to be applied first.
    pub reapplied: bool,
}

/// Result of `apply` and `unapply`.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// Branch moved.
    pub branch: BranchName,
    /// Files rewritten.
    pub files: Vec<String>,
    /// Whether the branch was already in the requested state.
    pub unchanged: bool,
}

/// Result of `push`.
#[derive(Debug, Clone)]
pub struct PushReport {
    /// Push details.
    pub outcome: PushOutcome,
    /// Set when the branch was deleted as integrated.
    pub deleted: Option<DeleteReport>,
}

/// One transaction's view of the workspace.
struct Txn<'a, G: GitOps> {
    repo: &'a G,
    state: &'a State,
    config: &'a Config,
    store: Store,
    base_tree: Oid,
    snapshot: WorkingTreeSnapshot,
    report: ReconcileReport,
}

impl<'a, G: GitOps> Txn<'a, G> {
    fn begin(repo: &'a G, state: &'a State, config: &'a Config, mut store: Store) -> Result<Self> {
        let base = store.base_id().map_err(|reason| Error::CorruptState {
            file: state.vgit_dir().join("state.json"),
            reason,
        })?;
        let base_tree = repo.read_tree(base)?;
        let (snapshot, report) = index(repo, config, base_tree, &mut store)?;

        Ok(Self {
            repo,
            state,
            config,
            store,
            base_tree,
            snapshot,
            report,
        })
    }

    /// Re-index after the working tree was rewritten.
    fn refresh(&mut self) -> Result<()> {
        let (snapshot, report) = index(self.repo, self.config, self.base_tree, &mut self.store)?;
        self.snapshot = snapshot;
        self.report = report;
        Ok(())
    }

    fn save(&self) -> Result<()> {
        self.state.save_store(&self.store)
    }

    /// Named branch, or the selected one.
    fn target(&self, name: Option<&str>) -> Result<BranchName> {
        match name {
            Some(name) => Ok(self.store.branches.require(name)?.name.clone()),
            None => self.store.selected.clone().ok_or(Error::NoBranchSelected),
        }
    }

    fn create(&mut self, name: BranchName) -> Result<()> {
        let base = self.store.base_id().map_err(|reason| Error::CorruptState {
            file: self.state.vgit_dir().join("state.json"),
            reason,
        })?;
        self.store.branches.create(VirtualBranch::new(name.clone(), base))?;
        info!(branch = %name, "created virtual branch");
        self.store.selected = Some(name);
        Ok(())
    }

    fn apply(&mut self, name: &str) -> Result<ApplyReport> {
        let branch = self.store.branches.require(name)?;
        let name = branch.name.clone();
        if branch.is_applied() {
            return Ok(ApplyReport { branch: name, files: Vec::new(), unchanged: true });
        }

        let plan = plan_apply(self.repo, &self.store, &self.snapshot, &name)?;
        materialize(self.repo, self.state, &mut self.store, &plan)?;
        self.refresh()?;
        Ok(ApplyReport {
            branch: name,
            files: plan.paths().into_iter().map(String::from).collect(),
            unchanged: false,
        })
    }

    fn unapply(&mut self, name: &str) -> Result<ApplyReport> {
        let branch = self.store.branches.require(name)?;
        let name = branch.name.clone();
        if !branch.is_applied() {
            return Ok(ApplyReport { branch: name, files: Vec::new(), unchanged: true });
        }

        let plan = match plan_unapply(self.repo, &self.store, &self.snapshot, &name) {
            Ok(plan) => plan,
            Err(e @ Error::UnapplyConflict { .. }) => {
                // Leave the branch applied but flag it.
                self.store.branches.require_mut(&name)?.needs_attention = true;
                self.save()?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        materialize(self.repo, self.state, &mut self.store, &plan)?;
        self.refresh()?;
        Ok(ApplyReport {
            branch: name,
            files: plan.paths().into_iter().map(String::from).collect(),
            unchanged: false,
        })
    }

    fn delete(&mut self, name: &str, force: bool) -> Result<DeleteReport> {
        let branch = self.store.branches.require(name)?;
        let name = branch.name.clone();
        let claimed = branch.hunks.len();
        if claimed > 0 && !force {
            return Err(Error::BranchNotEmpty { name: name.to_string(), claimed });
        }

        let reapplied = claimed > 0 && !branch.is_applied();
        if reapplied {
            self.apply(&name)?;
        }

        let released = self.store.ownership.release(&name, &mut self.store.branches);
        self.store.branches.remove(&name);
        if self.store.selected.as_ref() == Some(&name) {
            self.store.selected = None;
        }
        info!(branch = %name, released = released.len(), "deleted virtual branch");
        Ok(DeleteReport { branch: name, released: released.len(), reapplied })
    }

    /// Hunks in the working tree that `selectors` pick out.
    fn select(&self, selectors: &[Selector]) -> Result<Vec<(HunkId, bool)>> {
        let mut picked: Vec<(HunkId, bool)> = Vec::new();
        for selector in selectors {
            let before = picked.len();
            match selector {
                Selector::Hunk(prefix) => {
                    let id = self.store.ownership.resolve(prefix)?;
                    picked.push((id, true));
                }
                Selector::Lines { .. } => picked.extend(
                    self.snapshot
                        .hunks()
                        .iter()
                        .filter(|h| selector.matches(h))
                        .map(|h| (h.id.clone(), true)),
                ),
                Selector::All | Selector::Path(_) => picked.extend(
                    self.snapshot
                        .hunks()
                        .iter()
                        .filter(|h| selector.matches(h))
                        .map(|h| (h.id.clone(), false)),
                ),
            }
            if picked.len() == before {
                return Err(Error::InvalidSelector {
                    input: selector.to_string(),
                    reason: "matches no changes".into(),
                });
            }
        }

        let mut seen = BTreeSet::new();
        picked.retain(|(id, _)| seen.insert(id.clone()));
        Ok(picked)
    }
}

/// Diff the working tree and reconcile ownership with it.
///
/// Every record that should be on disk is offered for splitting: unclaimed
/// hunks and hunks of applied branches. Stashed hunks are not on disk.
fn index<G: GitOps>(
    repo: &G,
    config: &Config,
    base_tree: Oid,
    store: &mut Store,
) -> Result<(WorkingTreeSnapshot, ReconcileReport)> {
    let known: Vec<&Hunk> = store
        .ownership
        .hunks()
        .into_iter()
        .filter(|h| match store.ownership.owner(&h.id) {
            None => true,
            Some(owner) => store.branches.get(owner).is_some_and(VirtualBranch::is_applied),
        })
        .collect();
    let snapshot = WorkingTreeSnapshot::capture(repo, base_tree, &config.diff, &known)?;

    let report = store
        .ownership
        .reconcile(snapshot.hunks().to_vec(), &mut store.branches);
    for (id, owner) in report.lost_claims() {
        warn!(hunk = %id, branch = %owner, "claimed hunk left the working tree");
    }
    if !report.is_empty() {
        debug!(added = report.added.len(), dropped = report.dropped.len(), "reconciled ownership");
    }
    Ok((snapshot, report))
}

/// A repository with vgit state.
pub struct Workspace<G: GitOps = Repository> {
    repo: G,
    state: State,
    config: Config,
}

impl Workspace<Repository> {
    /// Open the repository containing `path`.
    ///
    /// # Errors
    /// Returns [`Error::NotARepository`] if `path` is not inside a work tree.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::open(path).map_err(|e| match e {
            vgit_git::Error::NotARepository | vgit_git::Error::BareRepository => {
                Error::NotARepository
            }
            other => other.into(),
        })?;
        Self::with_repo(repo)
    }

    /// Initialize vgit in the repository containing `path`.
    ///
    /// `base` defaults to `HEAD`. Every current change starts unclaimed.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyInitialized`] on a second run.
    pub fn init(path: impl AsRef<Path>, base: Option<&str>) -> Result<Self> {
        let mut ws = Self::open(path)?;
        ws.initialize(base)?;
        Ok(ws)
    }
}

impl<G: GitOps> Workspace<G> {
    /// Wrap an opened repository.
    ///
    /// # Errors
    /// Returns error if the config file cannot be parsed.
    pub fn with_repo(repo: G) -> Result<Self> {
        let state = State::new(repo.git_dir())?;
        let config = state.load_config()?;
        Ok(Self { repo, state, config })
    }

    /// Create the state store on `base` (default `HEAD`) and index the tree.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyInitialized`] if state exists.
    pub fn initialize(&mut self, base: Option<&str>) -> Result<Oid> {
        if self.state.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }
        let base = self.repo.resolve_commit(base.unwrap_or("HEAD"))?;
        self.state.init(&Store::new(base))?;
        self.config = self.state.load_config()?;
        self.mutate(|_| Ok(()))?;
        info!(%base, "initialized vgit");
        Ok(base)
    }

    /// Whether vgit state exists.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    /// The underlying repository.
    pub const fn repo(&self) -> &G {
        &self.repo
    }

    /// Loaded configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Working directory root.
    ///
    /// # Errors
    /// Returns error for bare repositories.
    pub fn workdir(&self) -> Result<&Path> {
        self.repo.workdir().ok_or(Error::NotARepository)
    }

    /// Repository-relative form of a directory inside the work tree.
    ///
    /// # Errors
    /// Returns error if `dir` is outside the repository.
    pub fn relative_prefix(&self, dir: &Path) -> Result<String> {
        let root = self.workdir()?.canonicalize()?;
        let dir = dir.canonicalize()?;
        let rel = dir.strip_prefix(&root).map_err(|_| Error::InvalidSelector {
            input: dir.display().to_string(),
            reason: "outside the repository".into(),
        })?;
        Ok(rel.to_string_lossy().replace('\\', "/"))
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut Txn<'_, G>) -> Result<T>) -> Result<T> {
        let _lock = RepoLock::acquire(&self.state.lock_path(), self.config.general.lock_timeout())?;

        let mut store = self.state.load_store()?;
        if let Some(branch) = recover(&self.repo, &self.state, &mut store)? {
            warn!(%branch, "rolled back an interrupted operation");
        }

        let mut txn = Txn::begin(&self.repo, &self.state, &self.config, store)?;
        let out = op(&mut txn)?;
        txn.save()?;
        Ok(out)
    }

    fn read(&self) -> Result<(Txn<'_, G>, bool)> {
        let store = self.state.load_store_consistent()?;
        let interrupted = self.state.load_journal()?.is_some()
            || store.branches.all().iter().any(|b| !b.status.is_stable());
        Ok((Txn::begin(&self.repo, &self.state, &self.config, store)?, interrupted))
    }

    /// Roll back an interrupted apply or unapply, if any.
    ///
    /// # Errors
    /// Returns error if the rollback cannot be written.
    pub fn recover(&self) -> Result<Option<BranchName>> {
        let _lock = RepoLock::acquire(&self.state.lock_path(), self.config.general.lock_timeout())?;
        let mut store = self.state.load_store()?;
        recover(&self.repo, &self.state, &mut store)
    }

    /// Re-index the working tree and persist the reconciled ownership.
    ///
    /// # Errors
    /// Returns [`Error::DiffFailure`] if a path cannot be read.
    pub fn refresh(&self) -> Result<ReconcileReport> {
        self.mutate(|txn| Ok(txn.report.clone()))
    }

    // === Read-only views ===

    /// Current branches, claims and unclaimed hunks.
    ///
    /// Does not take the lock and does not write anything.
    ///
    /// # Errors
    /// Returns error if state cannot be loaded or the tree cannot be diffed.
    pub fn status(&self) -> Result<Status> {
        let (txn, interrupted) = self.read()?;
        let store = &txn.store;

        let branches = store
            .branches
            .all()
            .iter()
            .map(|b| BranchStatus {
                branch: b.clone(),
                records: store.ownership.owned_by(&b.name).into_iter().cloned().collect(),
                selected: store.selected.as_ref() == Some(&b.name),
            })
            .collect();

        Ok(Status {
            base: store.base.clone(),
            selected: store.selected.clone(),
            branches,
            unclaimed: store.ownership.unclaimed().into_iter().cloned().collect(),
            attention: store.ownership.attention().clone(),
            interrupted,
        })
    }

    /// Branches in stack order.
    ///
    /// # Errors
    /// Returns error if state cannot be loaded.
    pub fn list(&self) -> Result<Vec<BranchStatus>> {
        Ok(self.status()?.branches)
    }

    /// A branch's commits, newest first.
    ///
    /// # Errors
    /// Returns [`Error::NoBranchSelected`] or [`Error::UnknownBranch`].
    pub fn log(&self, branch: Option<&str>, limit: Option<usize>) -> Result<(BranchName, Vec<CommitInfo>)> {
        let store = self.state.load_store_consistent()?;
        let name = match branch {
            Some(name) => store.branches.require(name)?.name.clone(),
            None => store.selected.clone().ok_or(Error::NoBranchSelected)?,
        };
        let commits = reconcile::log(&self.repo, &store, &name, limit)?;
        Ok((name, commits))
    }

    // === Branch store ===

    /// Create a branch on the workspace base and select it.
    ///
    /// # Errors
    /// [`Error::InvalidBranchName`] or [`Error::DuplicateName`].
    pub fn create_branch(&self, name: &str) -> Result<VirtualBranch> {
        let name = BranchName::new(name)?;
        self.mutate(|txn| {
            txn.create(name.clone())?;
            Ok(txn.store.branches.require(&name)?.clone())
        })
    }

    /// Delete a branch. With `force`, its hunks return to unclaimed; a
    /// stashed branch is applied first so its changes are not lost.
    ///
    /// # Errors
    /// [`Error::BranchNotEmpty`] without `force`, [`Error::ApplyConflict`] if
    /// a stashed branch cannot be brought back.
    pub fn delete_branch(&self, name: &str, force: bool) -> Result<DeleteReport> {
        self.mutate(|txn| txn.delete(name, force))
    }

    /// Rename a branch.
    ///
    /// The local ref of an earlier push keeps the old name; the remote
    /// branch stays the push target.
    ///
    /// # Errors
    /// [`Error::UnknownBranch`], [`Error::DuplicateName`] or
    /// [`Error::InvalidBranchName`].
    pub fn rename_branch(&self, from: &str, to: &str) -> Result<()> {
        let to = BranchName::new(to)?;
        self.mutate(|txn| {
            let store = &mut txn.store;
            let from = store.branches.require(from)?.name.clone();
            store.branches.rename(&from, to.clone())?;
            store.ownership.rename_owner(&from, &to);

            let branch = store.branches.require_mut(&to)?;
            if branch.pushed.is_some() && branch.upstream.is_none() {
                branch.upstream = Some(from.to_string());
            }
            branch.pushed = None;

            if store.selected.as_ref() == Some(&from) {
                store.selected = Some(to.clone());
            }
            info!(from = %from, to = %to, "renamed virtual branch");
            Ok(())
        })
    }

    /// Make `name` the default target branch.
    ///
    /// # Errors
    /// [`Error::UnknownBranch`].
    pub fn select(&self, name: &str) -> Result<BranchName> {
        self.mutate(|txn| {
            let name = txn.store.branches.require(name)?.name.clone();
            txn.store.selected = Some(name.clone());
            Ok(name)
        })
    }

    /// Move a branch to a new stack position (0-based, clamped).
    ///
    /// # Errors
    /// [`Error::UnknownBranch`].
    pub fn reorder(&self, name: &str, position: usize) -> Result<usize> {
        self.mutate(|txn| txn.store.branches.reorder(name, position))
    }

    // === Ownership ===

    /// Claim the hunks `selectors` pick (all hunks when empty).
    ///
    /// The target is `branch`, else the selected branch, else a new
    /// `{prefix}-{n}` branch. A named branch that does not exist is created.
    /// Path selectors skip hunks owned by other branches; line and id
    /// selectors name hunks explicitly and fail on them.
    ///
    /// # Errors
    /// [`Error::HunkAlreadyClaimed`], [`Error::InvalidSelector`],
    /// [`Error::UnknownHunk`] or [`Error::BranchNotApplied`].
    pub fn claim(&self, selectors: &[Selector], branch: Option<&str>) -> Result<ClaimReport> {
        self.mutate(|txn| {
            let (target, created) = match branch {
                Some(name) if txn.store.branches.get(name).is_none() => {
                    let name = BranchName::new(name)?;
                    txn.create(name.clone())?;
                    (name, true)
                }
                Some(name) => (txn.store.branches.require(name)?.name.clone(), false),
                None => match txn.store.selected.clone() {
                    Some(name) => (name, false),
                    None => {
                        let name = txn
                            .store
                            .branches
                            .next_implicit_name(&txn.config.general.branch_prefix)?;
                        txn.create(name.clone())?;
                        (name, true)
                    }
                },
            };

            let selectors = if selectors.is_empty() { &[Selector::All][..] } else { selectors };
            let picked = txn.select(selectors)?;

            let mut report = ClaimReport {
                branch: target.clone(),
                created,
                claimed: Vec::new(),
                already_owned: 0,
                skipped: Vec::new(),
            };
            for (id, explicit) in picked {
                let owner = txn.store.ownership.owner(&id).cloned();
                match owner {
                    Some(owner) if owner == target => report.already_owned += 1,
                    Some(owner) if !explicit => {
                        if let Some(h) = txn.store.ownership.hunk(&id) {
                            report.skipped.push((h.clone(), owner));
                        }
                    }
                    _ => {
                        txn.store.ownership.claim(&id, &target, &mut txn.store.branches)?;
                        if let Some(h) = txn.store.ownership.hunk(&id) {
                            report.claimed.push(h.clone());
                        }
                    }
                }
            }
            Ok(report)
        })
    }

    /// Return hunks to the unclaimed pool.
    ///
    /// With `all`, every hunk of every applied branch is released.
    ///
    /// # Errors
    /// [`Error::InvalidSelector`], [`Error::UnknownHunk`] or
    /// [`Error::HunkNotInWorkingTree`].
    pub fn unclaim(&self, selectors: &[Selector], all: bool) -> Result<Vec<(Hunk, BranchName)>> {
        self.mutate(|txn| {
            let ids: Vec<HunkId> = if all {
                txn.snapshot.hunks().iter().map(|h| h.id.clone()).collect()
            } else {
                txn.select(selectors)?.into_iter().map(|(id, _)| id).collect()
            };

            let mut released = Vec::new();
            for id in ids {
                if let Some(owner) = txn.store.ownership.unclaim(&id, &mut txn.store.branches)? {
                    if let Some(h) = txn.store.ownership.hunk(&id) {
                        released.push((h.clone(), owner));
                    }
                }
            }
            Ok(released)
        })
    }

    // === Apply engine ===

    /// Put a stashed branch's hunks back into the working tree.
    ///
    /// # Errors
    /// [`Error::ApplyConflict`]; the working tree is untouched.
    pub fn apply(&self, name: &str) -> Result<ApplyReport> {
        self.mutate(|txn| txn.apply(name))
    }

    /// Remove exactly a branch's hunks from the working tree.
    ///
    /// # Errors
    /// [`Error::UnapplyConflict`]; the branch stays applied and is flagged.
    pub fn unapply(&self, name: &str) -> Result<ApplyReport> {
        self.mutate(|txn| txn.unapply(name))
    }

    // === Commit/push ===

    /// Commit a branch (default: selected) without touching the working tree.
    ///
    /// # Errors
    /// [`Error::EmptyCommit`] or [`Error::NoBranchSelected`].
    pub fn commit(&self, branch: Option<&str>, message: &str) -> Result<(BranchName, CommitOutcome)> {
        self.mutate(|txn| {
            let name = txn.target(branch)?;
            let outcome = reconcile::commit(txn.repo, &mut txn.store, &name, message)?;
            Ok((name, outcome))
        })
    }

    /// Push a branch's head to `remote` (default `general.default_remote`).
    /// With `integrated`, delete the branch afterwards.
    ///
    /// # Errors
    /// [`Error::NonFastForward`] or [`Error::EmptyCommit`].
    pub fn push(
        &self,
        branch: Option<&str>,
        remote: Option<&str>,
        force: bool,
        integrated: bool,
    ) -> Result<(BranchName, PushReport)> {
        self.mutate(|txn| {
            let name = txn.target(branch)?;
            let remote = remote.unwrap_or(&txn.config.general.default_remote).to_string();
            let outcome = reconcile::push(txn.repo, &mut txn.store, &name, &remote, force)?;
            // The remote now has the commit; persist before deleting.
            txn.save()?;

            let deleted = if integrated { Some(txn.delete(&name, true)?) } else { None };
            Ok((name, PushReport { outcome, deleted }))
        })
    }
}

impl<G: GitOps> std::fmt::Debug for Workspace<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
