//! Commit/push reconciler: turns a virtual branch into real git objects.
//!
//! Commits are built from the base tree plus the branch's hunks in an
//! in-memory index; the live working tree and the repository index are
//! never touched. A real `refs/heads/<name>` only appears on push.

use std::collections::BTreeMap;

use tracing::{debug, info};
use vgit_git::{CommitInfo, GitOps, Oid, TreeOverride};

use crate::error::{Error, Result};
use crate::hunk::{Hunk, HunkKind, compose, composition_order};
use crate::index::read_workdir_file;
use crate::state::Store;

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// New commit.
    pub commit: Oid,
    /// Its tree.
    pub tree: Oid,
    /// Parent commit.
    pub parent: Oid,
    /// Number of hunks the tree contains.
    pub hunks: usize,
    /// Number of files the tree changes relative to the base.
    pub files: usize,
}

/// Result of a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// Commit published.
    pub commit: Oid,
    /// Remote pushed to.
    pub remote: String,
    /// Branch name on the remote.
    pub remote_branch: String,
    /// Whether the branch had never been pushed before.
    pub first_push: bool,
}

/// Build the tree of the base commit with only `hunks` applied.
///
/// # Errors
/// Returns [`Error::DiffFailure`] if a hunk no longer fits the base file or
/// binary content is missing from the object database.
pub fn build_tree<G: GitOps>(repo: &G, base_tree: Oid, hunks: &[&Hunk]) -> Result<(Oid, usize)> {
    let mut by_path: BTreeMap<&str, Vec<&Hunk>> = BTreeMap::new();
    for &hunk in hunks {
        by_path.entry(hunk.path.as_str()).or_default().push(hunk);
    }

    let mut overrides = Vec::with_capacity(by_path.len());
    for (path, mut hunks) in by_path {
        let base = repo.tree_entry(base_tree, path)?;
        let base_executable = base.is_some_and(|(_, exec)| exec);

        let entry = if let Some(hunk) = hunks.iter().find(|h| h.kind.is_whole_file()) {
            match hunk.kind {
                HunkKind::AddFile => TreeOverride {
                    path: path.to_string(),
                    blob: Some(repo.write_blob(hunk.added.concat().as_bytes())?),
                    executable: hunk.executable,
                },
                HunkKind::DeleteFile => TreeOverride {
                    path: path.to_string(),
                    blob: None,
                    executable: false,
                },
                _ => TreeOverride {
                    path: path.to_string(),
                    blob: Some(binary_blob(repo, hunk)?),
                    executable: base_executable,
                },
            }
        } else {
            let Some((blob, _)) = base else {
                return Err(misfit(path, "base file is missing"));
            };
            let data = repo.read_blob(blob)?;
            let text = std::str::from_utf8(&data).map_err(|_| misfit(path, "base file is not text"))?;

            hunks.sort_by_key(|h| composition_order(h, 0));
            let content =
                compose(text, &hunks).ok_or_else(|| misfit(path, "hunks no longer fit the base"))?;
            TreeOverride {
                path: path.to_string(),
                blob: Some(repo.write_blob(content.as_bytes())?),
                executable: base_executable,
            }
        };
        overrides.push(entry);
    }

    let files = overrides.len();
    Ok((repo.write_tree(base_tree, &overrides)?, files))
}

/// Blob holding a binary hunk's content, storing it from disk if needed.
fn binary_blob<G: GitOps>(repo: &G, hunk: &Hunk) -> Result<Oid> {
    let blob = hunk
        .new_blob_id()
        .ok_or_else(|| misfit(&hunk.path, "binary hunk has no content id"))?;
    if repo.read_blob(blob).is_ok() {
        return Ok(blob);
    }

    let workdir = repo.workdir().ok_or(Error::NotARepository)?;
    match read_workdir_file(workdir, &hunk.path)? {
        (Some(data), _) if vgit_git::hash_blob(&data)? == blob => Ok(repo.write_blob(&data)?),
        _ => Err(misfit(&hunk.path, "binary content changed since it was claimed")),
    }
}

fn misfit(path: &str, reason: &str) -> Error {
    Error::DiffFailure {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Commit the branch's hunks on top of its head.
///
/// # Errors
/// Returns [`Error::EmptyCommit`] if the branch claims nothing or nothing
/// changed since its last commit.
pub fn commit<G: GitOps>(repo: &G, store: &mut Store, branch: &str, message: &str) -> Result<CommitOutcome> {
    let base = Oid::from_str(&store.base).map_err(vgit_git::Error::from)?;
    let base_tree = repo.read_tree(base)?;

    let hunks = store.ownership.owned_by(branch);
    let target = store.branches.require(branch)?;
    if hunks.is_empty() {
        return Err(Error::EmptyCommit {
            branch: branch.to_string(),
            reason: "no hunks claimed".into(),
        });
    }

    let (tree, files) = build_tree(repo, base_tree, &hunks)?;
    let parent = target.head_id().unwrap_or(base);
    if repo.read_tree(parent)? == tree {
        return Err(Error::EmptyCommit {
            branch: branch.to_string(),
            reason: "no changes since the last commit".into(),
        });
    }

    let commit = repo.create_commit(tree, &[parent], message)?;
    let count = hunks.len();

    let target = store.branches.require_mut(branch)?;
    target.head = Some(commit.to_string());
    target.touch();
    info!(branch, %commit, hunks = count, "committed virtual branch");

    Ok(CommitOutcome {
        commit,
        tree,
        parent,
        hunks: count,
        files,
    })
}

/// Publish the branch head as `refs/heads/<name>` and push it.
///
/// The local ref is written with compare-and-swap against the last pushed
/// commit, so a concurrent writer makes this fail instead of being
/// overwritten.
///
/// # Errors
/// - [`Error::EmptyCommit`] if the branch has no commits
/// - [`Error::NonFastForward`] if the local ref moved or the remote diverged
pub fn push<G: GitOps>(repo: &G, store: &mut Store, branch: &str, remote: &str, force: bool) -> Result<PushOutcome> {
    let target = store.branches.require(branch)?;
    let Some(head) = target.head_id() else {
        return Err(Error::EmptyCommit {
            branch: branch.to_string(),
            reason: "nothing committed yet - run `vgit commit` first".into(),
        });
    };
    let local_ref = target.name.ref_name();
    let remote_branch = target.upstream.clone().unwrap_or_else(|| target.name.to_string());
    let first_push = target.pushed.is_none();

    let current = repo.read_ref(&local_ref)?;
    if current != Some(head) {
        let expected = if force { current } else { target.pushed_id() };
        debug!(%local_ref, ?expected, %head, "updating local ref");
        repo.write_ref(&local_ref, head, expected).map_err(|e| match e {
            vgit_git::Error::RefConflict { name, .. } => Error::NonFastForward {
                branch: branch.to_string(),
                target: name,
            },
            other => other.into(),
        })?;
    }

    repo.push(&local_ref, remote, &remote_branch, force)
        .map_err(|e| match e {
            vgit_git::Error::NonFastForward(rejected) => Error::NonFastForward {
                branch: branch.to_string(),
                target: rejected,
            },
            other => other.into(),
        })?;

    let target = store.branches.require_mut(branch)?;
    target.pushed = Some(head.to_string());
    target.upstream = Some(remote_branch.clone());
    target.touch();
    info!(branch, remote, %head, "pushed virtual branch");

    Ok(PushOutcome {
        commit: head,
        remote: remote.to_string(),
        remote_branch,
        first_push,
    })
}

/// The branch's commits from head back to its base, newest first.
///
/// # Errors
/// Returns error if history cannot be walked.
pub fn log<G: GitOps>(repo: &G, store: &Store, branch: &str, limit: Option<usize>) -> Result<Vec<CommitInfo>> {
    let target = store.branches.require(branch)?;
    let Some(head) = target.head_id() else {
        return Ok(Vec::new());
    };
    let base = target
        .base_id()
        .map_or_else(|| Oid::from_str(&store.base).map_err(vgit_git::Error::from), Ok)?;

    repo.commits_between(base, head)?
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|id| repo.commit_info(id).map_err(Error::from))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::BranchName;
    use crate::branch::VirtualBranch;
    use crate::config::DiffConfig;
    use crate::index::WorkingTreeSnapshot;
    use crate::test_support::TestRepo;
    use std::process::Command;

    fn setup(files: &[(&str, &str)], branches: &[&str]) -> (TestRepo, Store) {
        let t = TestRepo::new(files);
        let mut store = Store::new(t.base);
        for name in branches {
            store
                .branches
                .create(VirtualBranch::new(BranchName::new(*name).unwrap(), t.base))
                .unwrap();
        }
        (t, store)
    }

    fn index(t: &TestRepo, store: &mut Store) {
        let snap =
            WorkingTreeSnapshot::capture(&t.repo, t.base_tree(), &DiffConfig::default(), &[]).unwrap();
        store.ownership.reconcile(snap.into_hunks(), &mut store.branches);
    }

    fn claim_where(store: &mut Store, branch: &str, pred: impl Fn(&Hunk) -> bool) {
        let ids: Vec<_> = store
            .ownership
            .unclaimed()
            .into_iter()
            .filter(|h| pred(h))
            .map(|h| h.id.clone())
            .collect();
        for id in ids {
            store.ownership.claim(&id, branch, &mut store.branches).unwrap();
        }
    }

    fn blob_at(t: &TestRepo, commit: Oid, path: &str) -> Option<String> {
        let tree = t.repo.read_tree(commit).unwrap();
        t.repo
            .tree_entry(tree, path)
            .unwrap()
            .map(|(b, _)| String::from_utf8(t.repo.read_blob(b).unwrap()).unwrap())
    }

    #[test]
    fn test_commit_isolates_branch_hunks() {
        let (t, mut store) = setup(&[("a.txt", &TestRepo::numbered(30))], &["feat-x", "feat-y"]);
        t.edit_lines("a.txt", &[(1, "x1"), (2, "x2"), (21, "y21")]);
        t.write("y.txt", "only y\n");
        index(&t, &mut store);
        claim_where(&mut store, "feat-x", |h| h.path == "a.txt" && h.old_start == 0);
        claim_where(&mut store, "feat-y", |_| true);

        let working_before = t.read("a.txt");
        let out = commit(&t.repo, &mut store, "feat-x", "Add x").unwrap();

        let mut expected = TestRepo::numbered(30).replacen("line 1\nline 2\n", "x1\nx2\n", 1);
        assert_eq!(blob_at(&t, out.commit, "a.txt").unwrap(), expected);
        assert!(blob_at(&t, out.commit, "y.txt").is_none());
        assert_eq!(out.parent, t.base);
        assert_eq!(out.files, 1);
        assert_eq!(t.read("a.txt"), working_before);
        assert_eq!(t.repo.head_commit().unwrap(), t.base);
        assert_eq!(store.branches.get("feat-x").unwrap().head_id(), Some(out.commit));

        let y = commit(&t.repo, &mut store, "feat-y", "Add y").unwrap();
        expected = TestRepo::numbered(30).replacen("line 21\n", "y21\n", 1);
        assert_eq!(blob_at(&t, y.commit, "a.txt").unwrap(), expected);
        assert_eq!(blob_at(&t, y.commit, "y.txt").unwrap(), "only y\n");
    }

    #[test]
    fn test_commit_empty_cases() {
        let (t, mut store) = setup(&[("a.txt", "a\n")], &["feat-x"]);
        assert!(matches!(
            commit(&t.repo, &mut store, "feat-x", "nothing"),
            Err(Error::EmptyCommit { .. })
        ));

        t.write("a.txt", "b\n");
        index(&t, &mut store);
        claim_where(&mut store, "feat-x", |_| true);
        let first = commit(&t.repo, &mut store, "feat-x", "first").unwrap();
        assert!(matches!(
            commit(&t.repo, &mut store, "feat-x", "again"),
            Err(Error::EmptyCommit { ref reason, .. }) if reason.contains("since")
        ));

        // A later change stacks on the previous commit.
        t.write("b.txt", "new\n");
        index(&t, &mut store);
        claim_where(&mut store, "feat-x", |_| true);
        let second = commit(&t.repo, &mut store, "feat-x", "second").unwrap();
        assert_eq!(second.parent, first.commit);

        let history = log(&t.repo, &store, "feat-x", None).unwrap();
        let summaries: Vec<&str> = history.iter().map(|c| c.summary.as_str()).collect();
        assert_eq!(summaries, vec!["second", "first"]);
        assert_eq!(log(&t.repo, &store, "feat-x", Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_push_requires_commit() {
        let (t, mut store) = setup(&[("a.txt", "a\n")], &["feat-x"]);
        assert!(matches!(
            push(&t.repo, &mut store, "feat-x", "origin", false),
            Err(Error::EmptyCommit { .. })
        ));
    }

    #[test]
    fn test_push_cas_rejects_foreign_ref() {
        let (t, mut store) = setup(&[("a.txt", "a\n")], &["feat-x"]);
        t.write("a.txt", "b\n");
        index(&t, &mut store);
        claim_where(&mut store, "feat-x", |_| true);
        commit(&t.repo, &mut store, "feat-x", "x").unwrap();

        // Someone else created refs/heads/feat-x in the meantime.
        t.repo.write_ref("refs/heads/feat-x", t.base, None).unwrap();

        let err = push(&t.repo, &mut store, "feat-x", "origin", false).unwrap_err();
        assert!(matches!(err, Error::NonFastForward { ref target, .. } if target == "refs/heads/feat-x"));
        assert_eq!(t.repo.read_ref("refs/heads/feat-x").unwrap(), Some(t.base));
        assert!(store.branches.get("feat-x").unwrap().pushed.is_none());
    }

    #[test]
    fn test_push_to_bare_remote() {
        let (t, mut store) = setup(&[("a.txt", "a\n")], &["feat-x"]);
        let remote = tempfile::TempDir::new().unwrap();
        git2::Repository::init_bare(remote.path()).unwrap();
        let status = Command::new("git")
            .args(["remote", "add", "origin"])
            .arg(remote.path())
            .current_dir(t.root())
            .status()
            .unwrap();
        assert!(status.success());

        t.write("a.txt", "b\n");
        index(&t, &mut store);
        claim_where(&mut store, "feat-x", |_| true);
        let c = commit(&t.repo, &mut store, "feat-x", "x").unwrap();

        let out = push(&t.repo, &mut store, "feat-x", "origin", false).unwrap();
        assert!(out.first_push);
        assert_eq!(out.remote_branch, "feat-x");

        let bare = git2::Repository::open_bare(remote.path()).unwrap();
        assert_eq!(bare.refname_to_id("refs/heads/feat-x").unwrap(), c.commit);
        assert_eq!(t.repo.read_ref("refs/heads/feat-x").unwrap(), Some(c.commit));
        assert_eq!(store.branches.get("feat-x").unwrap().pushed_id(), Some(c.commit));
    }
}
