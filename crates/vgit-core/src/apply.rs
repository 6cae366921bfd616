//! Apply/unapply engine.
//!
//! Both directions follow the same path: compute every new file content in
//! memory first (the plan), fail with a conflict before anything is written,
//! then materialize the plan behind a journal so an interrupted run can be
//! rolled back by [`recover`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, warn};
use vgit_git::GitOps;

use crate::BranchName;
use crate::branch::ApplyState;
use crate::error::{Error, Result};
use crate::hunk::{Hunk, HunkKind, compose, composition_order};
use crate::index::{FileState, WorkingTreeSnapshot};
use crate::state::{Journal, JournalEntry, Store, write_atomic};
use crate::traits::StateStore;

/// New content for one working file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    /// Path relative to the repository root.
    pub path: String,
    /// New content, `None` to remove the file.
    pub content: Option<Vec<u8>>,
    /// Executable bit of the new file.
    pub executable: bool,
    pre_image: Option<Vec<u8>>,
    pre_executable: bool,
}

impl FileWrite {
    fn new(file: &FileState, content: Option<Vec<u8>>, executable: bool) -> Self {
        Self {
            path: file.path.clone(),
            content,
            executable,
            pre_image: file.current.clone(),
            pre_executable: file.executable,
        }
    }
}

/// Every file write needed to move a branch to `target`.
#[derive(Debug, Clone)]
pub struct ApplyPlan {
    /// Branch being moved.
    pub branch: BranchName,
    /// Stable state after the plan runs.
    pub target: ApplyState,
    /// Files to rewrite, in path order.
    pub writes: Vec<FileWrite>,
}

impl ApplyPlan {
    /// Paths the plan touches.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.writes.iter().map(|w| w.path.as_str()).collect()
    }
}

/// Plan re-inserting a stashed branch's hunks into the working tree.
///
/// Stored hunks are composed with every hunk currently in the working tree
/// against the base file, in stack order.
///
/// # Errors
/// Returns [`Error::ApplyConflict`] naming every path where the stored hunks
/// overlap current changes, were computed against a different base, or no
/// longer fit.
pub fn plan_apply<G: GitOps>(
    repo: &G,
    store: &Store,
    snapshot: &WorkingTreeSnapshot,
    branch: &str,
) -> Result<ApplyPlan> {
    let target = store.branches.require(branch)?;
    let stored = store.ownership.owned_by(branch);

    let mut by_path: BTreeMap<&str, Vec<&Hunk>> = BTreeMap::new();
    for hunk in stored {
        by_path.entry(hunk.path.as_str()).or_default().push(hunk);
    }

    let mut conflicts = BTreeSet::new();
    let mut writes = Vec::new();

    for (path, hunks) in by_path {
        let file = snapshot.file_or_load(repo, path)?;
        let current: Vec<&Hunk> = snapshot.hunks_in(path).collect();

        let fits = hunks.iter().all(|h| {
            h.base_blob_id() == file.base_blob
                && snapshot.get(&h.id).is_none()
                && !current.iter().any(|c| c.overlaps(h))
        });
        if !fits {
            debug!(path, "stored hunks clash with the working tree");
            conflicts.insert(path.to_string());
            continue;
        }

        match whole_file_hunk(&hunks) {
            Some(hunk) => match apply_whole_file(repo, &file, hunk)? {
                Some(write) => writes.push(write),
                None => {
                    conflicts.insert(path.to_string());
                }
            },
            None => {
                let mut ranked: Vec<(&Hunk, usize)> = current
                    .iter()
                    .map(|c| (*c, store.branches.rank(store.ownership.owner(&c.id))))
                    .collect();
                let rank = store.branches.rank(Some(&target.name));
                ranked.extend(hunks.iter().map(|h| (*h, rank)));

                match compose_file(&file, ranked) {
                    Some(content) => writes.push(FileWrite::new(&file, Some(content), file.executable)),
                    None => {
                        conflicts.insert(path.to_string());
                    }
                }
            }
        }
    }

    if !conflicts.is_empty() {
        return Err(Error::ApplyConflict {
            branch: branch.to_string(),
            paths: conflicts.into_iter().collect(),
        });
    }

    Ok(ApplyPlan {
        branch: target.name.clone(),
        target: ApplyState::Applied,
        writes,
    })
}

/// Plan removing exactly a branch's hunks from the working tree.
///
/// Every other hunk on the same files, claimed or not, is recomposed onto
/// the base so unrelated edits survive. Binary content that is about to be
/// removed is stored in the object database first.
///
/// # Errors
/// Returns [`Error::UnapplyConflict`] naming the paths whose branch hunks
/// are no longer present verbatim in the working tree.
pub fn plan_unapply<G: GitOps>(
    repo: &G,
    store: &Store,
    snapshot: &WorkingTreeSnapshot,
    branch: &str,
) -> Result<ApplyPlan> {
    let target = store.branches.require(branch)?;

    let mut missing = BTreeSet::new();
    let mut by_path: BTreeMap<&str, Vec<&Hunk>> = BTreeMap::new();
    for id in &target.hunks {
        match snapshot.get(id) {
            Some(hunk) => by_path.entry(hunk.path.as_str()).or_default().push(hunk),
            None => {
                let path = store
                    .ownership
                    .hunk(id)
                    .map_or_else(|| id.to_string(), |h| h.path.clone());
                missing.insert(path);
            }
        }
    }
    if !missing.is_empty() {
        return Err(Error::UnapplyConflict {
            branch: branch.to_string(),
            paths: missing.into_iter().collect(),
        });
    }

    let mut conflicts = BTreeSet::new();
    let mut writes = Vec::new();

    for (path, hunks) in by_path {
        let file = snapshot.file_or_load(repo, path)?;

        if let Some(hunk) = whole_file_hunk(&hunks) {
            if hunk.kind == HunkKind::Binary {
                if let Some(data) = &file.current {
                    repo.write_blob(data)?;
                }
            }
            writes.push(FileWrite::new(&file, file.base.clone(), file.base_executable));
            continue;
        }

        let ids: BTreeSet<_> = hunks.iter().map(|h| &h.id).collect();
        let remaining: Vec<(&Hunk, usize)> = snapshot
            .hunks_in(path)
            .filter(|h| !ids.contains(&h.id))
            .map(|h| (h, store.branches.rank(store.ownership.owner(&h.id))))
            .collect();

        match compose_file(&file, remaining) {
            Some(content) => writes.push(FileWrite::new(&file, Some(content), file.executable)),
            None => {
                conflicts.insert(path.to_string());
            }
        }
    }

    if !conflicts.is_empty() {
        return Err(Error::UnapplyConflict {
            branch: branch.to_string(),
            paths: conflicts.into_iter().collect(),
        });
    }

    Ok(ApplyPlan {
        branch: target.name.clone(),
        target: ApplyState::Unapplied,
        writes,
    })
}

fn whole_file_hunk<'a>(hunks: &[&'a Hunk]) -> Option<&'a Hunk> {
    hunks.iter().copied().find(|h| h.kind.is_whole_file())
}

/// Content of a file after applying a stored whole-file hunk, `None` if the
/// file is not in the state the hunk expects.
fn apply_whole_file<G: GitOps>(repo: &G, file: &FileState, hunk: &Hunk) -> Result<Option<FileWrite>> {
    let write = match hunk.kind {
        HunkKind::AddFile if file.current.is_none() => {
            let content = hunk.added.concat().into_bytes();
            Some(FileWrite::new(file, Some(content), hunk.executable))
        }
        HunkKind::DeleteFile if file.is_unchanged() => Some(FileWrite::new(file, None, false)),
        HunkKind::Binary if file.is_unchanged() => {
            let Some(blob) = hunk.new_blob_id() else {
                return Ok(None);
            };
            let content = repo.read_blob(blob)?;
            let executable = file.current.is_some() && file.executable;
            Some(FileWrite::new(file, Some(content), executable))
        }
        _ => None,
    };
    Ok(write)
}

/// Compose base plus ranked line hunks into file bytes.
fn compose_file(file: &FileState, mut hunks: Vec<(&Hunk, usize)>) -> Option<Vec<u8>> {
    let base = std::str::from_utf8(file.base.as_deref()?).ok()?;
    hunks.sort_by_key(|(h, rank)| composition_order(h, *rank));
    let ordered: Vec<&Hunk> = hunks.into_iter().map(|(h, _)| h).collect();
    compose(base, &ordered).map(String::into_bytes)
}

/// Write a plan to the working tree behind a journal.
///
/// Order: journal, transient status, file writes, final status, journal
/// removal. A failure part way through rolls back immediately; if that fails
/// as well the journal is left for [`recover`].
///
/// # Errors
/// Returns error if persisting state or writing a file fails.
pub fn materialize<G: GitOps, S: StateStore>(
    repo: &G,
    state: &S,
    store: &mut Store,
    plan: &ApplyPlan,
) -> Result<()> {
    let workdir = repo.workdir().ok_or(Error::NotARepository)?;
    let prior = store.branches.require(&plan.branch)?.status;

    let mut files = Vec::with_capacity(plan.writes.len());
    for write in &plan.writes {
        let pre_image = write
            .pre_image
            .as_deref()
            .map(|data| repo.write_blob(data))
            .transpose()?;
        files.push(JournalEntry {
            path: write.path.clone(),
            pre_image: pre_image.map(|b| b.to_string()),
            executable: write.pre_executable,
        });
    }
    let journal = Journal {
        branch: plan.branch.clone(),
        prior,
        started_at: Utc::now(),
        files,
    };
    state.save_journal(&journal)?;

    store.branches.require_mut(&plan.branch)?.status = plan.target.transition();
    state.save_store(store)?;

    for write in &plan.writes {
        if let Err(e) = write_file(workdir, &write.path, write.content.as_deref(), write.executable) {
            warn!(path = %write.path, error = %e, "write failed, rolling back");
            if let Err(rollback) = recover(repo, state, store) {
                warn!(error = %rollback, "rollback failed; journal kept for next run");
            }
            return Err(e);
        }
    }

    let branch = store.branches.require_mut(&plan.branch)?;
    branch.status = plan.target;
    branch.needs_attention = false;
    branch.touch();
    state.save_store(store)?;
    state.clear_journal()?;

    info!(branch = %plan.branch, state = plan.target.label(), files = plan.writes.len(), "branch state changed");
    Ok(())
}

/// Roll back an interrupted apply or unapply.
///
/// Restores every journaled pre-image and the branch's prior status. Without
/// a journal, branches left in a transient status are reset to the stable
/// state they came from. Returns the branch that was rolled back, if any.
///
/// # Errors
/// Returns error if a pre-image cannot be restored or state cannot be saved.
pub fn recover<G: GitOps, S: StateStore>(
    repo: &G,
    state: &S,
    store: &mut Store,
) -> Result<Option<BranchName>> {
    let workdir = repo.workdir().ok_or(Error::NotARepository)?;

    if let Some(journal) = state.load_journal()? {
        warn!(branch = %journal.branch, files = journal.files.len(), "rolling back interrupted operation");
        for entry in &journal.files {
            let content = entry
                .pre_image
                .as_deref()
                .map(|id| -> Result<Vec<u8>> {
                    let oid = vgit_git::Oid::from_str(id).map_err(vgit_git::Error::from)?;
                    Ok(repo.read_blob(oid)?)
                })
                .transpose()?;
            write_file(workdir, &entry.path, content.as_deref(), entry.executable)?;
        }
        if let Some(branch) = store.branches.get_mut(&journal.branch) {
            branch.status = journal.prior;
        }
        state.save_store(store)?;
        state.clear_journal()?;
        return Ok(Some(journal.branch));
    }

    let mut reset = None;
    for branch in store.branches.iter_mut() {
        if !branch.status.is_stable() {
            warn!(branch = %branch.name, state = branch.status.label(), "resetting transient branch state");
            branch.status = branch.status.rollback();
            reset = Some(branch.name.clone());
        }
    }
    if reset.is_some() {
        state.save_store(store)?;
    }
    Ok(reset)
}

/// Replace or remove one working file.
fn write_file(workdir: &Path, path: &str, content: Option<&[u8]>, executable: bool) -> Result<()> {
    let full = workdir.join(path);
    match content {
        Some(data) => write_atomic(&full, data, Some(executable)),
        None => {
            match fs::remove_file(&full) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            // Drop directories the removal emptied.
            let mut dir = full.parent();
            while let Some(d) = dir {
                if d == workdir || fs::remove_dir(d).is_err() {
                    break;
                }
                dir = d.parent();
            }
            Ok(())
        }
    }
}
