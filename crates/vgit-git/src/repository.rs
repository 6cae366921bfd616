//! Repository wrapper providing the git capabilities VGit consumes.

use std::path::Path;

use git2::{Delta, DiffOptions, ErrorCode, FileMode, IndexEntry, IndexTime, ObjectType, Oid};
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::GitOps;

/// How a path differs between the base tree and the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    /// Path is absent from the base tree (new or untracked file).
    Added,
    /// Path exists on both sides with different content.
    Modified,
    /// Path exists in the base tree but not on disk.
    Deleted,
}

/// A path that differs between a tree and the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    /// File path relative to repository root, `/`-separated.
    pub path: String,
    /// Kind of change.
    pub status: ChangeStatus,
    /// Blob id of the path in the base tree.
    pub base_blob: Option<Oid>,
    /// Whether the working copy is executable.
    pub executable: bool,
}

/// A path replacement applied on top of a base tree by [`GitOps::write_tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeOverride {
    /// File path relative to repository root.
    pub path: String,
    /// New blob, or `None` to remove the path.
    pub blob: Option<Oid>,
    /// Whether the entry is executable.
    pub executable: bool,
}

/// Summary of a commit for log display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Commit id.
    pub id: Oid,
    /// First line of the message.
    pub summary: String,
    /// Author as `Name <email>`.
    pub author: String,
    /// Commit time in seconds since the epoch.
    pub time: i64,
}

/// High-level wrapper around a git repository.
pub struct Repository {
    inner: git2::Repository,
}

impl Repository {
    /// Open a repository at the given path.
    ///
    /// # Errors
    /// Returns error if no repository found at path or any parent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let inner = git2::Repository::discover(path).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                Error::NotARepository
            } else {
                Error::Git2(e)
            }
        })?;
        if inner.is_bare() {
            return Err(Error::BareRepository);
        }
        Ok(Self { inner })
    }

    /// Get the commit HEAD points at.
    ///
    /// # Errors
    /// Returns error if HEAD is unborn.
    pub fn head_commit(&self) -> Result<Oid> {
        let head = self.inner.head()?;
        Ok(head.peel_to_commit()?.id())
    }

    /// Get a reference to the underlying git2 repository.
    ///
    /// Use sparingly - prefer the [`GitOps`] methods.
    #[must_use]
    pub const fn inner(&self) -> &git2::Repository {
        &self.inner
    }
}

impl GitOps for Repository {
    fn workdir(&self) -> Option<&Path> {
        self.inner.workdir()
    }

    fn git_dir(&self) -> &Path {
        self.inner.path()
    }

    fn resolve_commit(&self, rev: &str) -> Result<Oid> {
        let object = self
            .inner
            .revparse_single(rev)
            .map_err(|_| Error::BadRevision(rev.into()))?;
        let commit = object
            .peel_to_commit()
            .map_err(|_| Error::BadRevision(rev.into()))?;
        Ok(commit.id())
    }

    fn read_tree(&self, commit: Oid) -> Result<Oid> {
        Ok(self.inner.find_commit(commit)?.tree_id())
    }

    fn tree_entry(&self, tree: Oid, path: &str) -> Result<Option<(Oid, bool)>> {
        let tree = self.inner.find_tree(tree)?;
        match tree.get_path(Path::new(path)) {
            Ok(entry) if entry.kind() == Some(ObjectType::Blob) => {
                let executable = entry.filemode() == i32::from(FileMode::BlobExecutable);
                Ok(Some((entry.id(), executable)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_blob(&self, blob: Oid) -> Result<Vec<u8>> {
        Ok(self.inner.find_blob(blob)?.content().to_vec())
    }

    fn write_blob(&self, data: &[u8]) -> Result<Oid> {
        Ok(self.inner.blob(data)?)
    }

    fn write_tree(&self, base: Oid, overrides: &[TreeOverride]) -> Result<Oid> {
        // An in-memory index keeps the repository's real index untouched.
        let tree = self.inner.find_tree(base)?;
        let mut index = git2::Index::new()?;
        index.read_tree(&tree)?;

        for item in overrides {
            match item.blob {
                Some(id) => {
                    let mode = if item.executable {
                        FileMode::BlobExecutable
                    } else {
                        FileMode::Blob
                    };
                    index.add(&IndexEntry {
                        ctime: IndexTime::new(0, 0),
                        mtime: IndexTime::new(0, 0),
                        dev: 0,
                        ino: 0,
                        mode: u32::from(mode),
                        uid: 0,
                        gid: 0,
                        file_size: 0,
                        id,
                        flags: 0,
                        flags_extended: 0,
                        path: item.path.as_bytes().to_vec(),
                    })?;
                }
                None => {
                    if index.get_path(Path::new(&item.path), 0).is_some() {
                        index.remove_path(Path::new(&item.path))?;
                    }
                }
            }
        }

        Ok(index.write_tree_to(&self.inner)?)
    }

    fn create_commit(&self, tree: Oid, parents: &[Oid], message: &str) -> Result<Oid> {
        let sig = self.inner.signature()?;
        let tree = self.inner.find_tree(tree)?;
        let parents = parents
            .iter()
            .map(|id| self.inner.find_commit(*id))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let id = self
            .inner
            .commit(None, &sig, &sig, message, &tree, &parent_refs)?;
        debug!(commit = %id, "created commit");
        Ok(id)
    }

    fn diff_paths(&self, tree: Oid) -> Result<Vec<PathChange>> {
        let tree = self.inner.find_tree(tree)?;
        let mut opts = DiffOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_typechange(true);

        let diff = self.inner.diff_tree_to_workdir(Some(&tree), Some(&mut opts))?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let status = match delta.status() {
                Delta::Added | Delta::Untracked => ChangeStatus::Added,
                Delta::Deleted => ChangeStatus::Deleted,
                Delta::Modified | Delta::Typechange => ChangeStatus::Modified,
                _ => continue,
            };

            let old = delta.old_file();
            let new = delta.new_file();
            // Symlinks and submodules are not line content.
            if [old.mode(), new.mode()]
                .iter()
                .any(|m| matches!(m, FileMode::Link | FileMode::Commit))
            {
                debug!(path = ?new.path(), "skipping non-blob entry");
                continue;
            }

            let Some(path) = new.path().or_else(|| old.path()) else {
                continue;
            };
            let path = path.to_string_lossy().replace('\\', "/");

            let base_blob = match status {
                ChangeStatus::Added => None,
                _ => Some(old.id()),
            };

            changes.push(PathChange {
                path,
                status,
                base_blob,
                executable: new.mode() == FileMode::BlobExecutable,
            });
        }

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    fn commits_between(&self, from: Oid, to: Oid) -> Result<Vec<Oid>> {
        let mut revwalk = self.inner.revwalk()?;
        revwalk.push(to)?;
        revwalk.hide(from)?;
        Ok(revwalk.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn commit_info(&self, commit: Oid) -> Result<CommitInfo> {
        let commit = self.inner.find_commit(commit)?;
        let author = commit.author();
        Ok(CommitInfo {
            id: commit.id(),
            summary: commit.summary().unwrap_or_default().to_string(),
            author: format!(
                "{} <{}>",
                author.name().unwrap_or_default(),
                author.email().unwrap_or_default()
            ),
            time: commit.time().seconds(),
        })
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self.inner.graph_descendant_of(descendant, ancestor)?)
    }

    fn read_ref(&self, name: &str) -> Result<Option<Oid>> {
        match self.inner.refname_to_id(name) {
            Ok(id) => Ok(Some(id)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_ref(&self, name: &str, target: Oid, expected_old: Option<Oid>) -> Result<()> {
        let log_message = format!("vgit: update to {}", &target.to_string()[..8]);
        let result = match expected_old {
            Some(old) => self
                .inner
                .reference_matching(name, target, true, old, &log_message),
            None => self.inner.reference(name, target, false, &log_message),
        };

        match result {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.code(), ErrorCode::Modified | ErrorCode::Exists) => {
                Err(Error::RefConflict {
                    name: name.into(),
                    expected: expected_old.map_or_else(|| "absent".into(), |o| o.to_string()),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn push(&self, local_ref: &str, remote: &str, remote_ref: &str, force: bool) -> Result<()> {
        if self.inner.find_remote(remote).is_err() {
            return Err(Error::RemoteNotFound(remote.into()));
        }
        let workdir = self.workdir().ok_or(Error::BareRepository)?;
        crate::remote::push_ref(workdir, local_ref, remote, remote_ref, force)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.git_dir())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn init_test_repo() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();
        let repo = git2::Repository::init(temp.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Test User").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
        }

        fs::write(temp.path().join("a.txt"), "one\ntwo\n").unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/lib.rs"), "fn main() {}\n").unwrap();

        // Scoped to drop borrows before moving repo
        {
            let mut index = repo.index().unwrap();
            index
                .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
                .unwrap();
            index.write().unwrap();
            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = repo.signature().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
                .unwrap();
        }

        (temp, Repository { inner: repo })
    }

    #[test]
    fn test_diff_paths_reports_all_change_kinds() {
        let (temp, repo) = init_test_repo();
        let head = repo.head_commit().unwrap();
        let tree = repo.read_tree(head).unwrap();

        assert!(repo.diff_paths(tree).unwrap().is_empty());

        fs::write(temp.path().join("a.txt"), "one\n2\n").unwrap();
        fs::remove_file(temp.path().join("src/lib.rs")).unwrap();
        fs::create_dir(temp.path().join("docs")).unwrap();
        fs::write(temp.path().join("docs/new.md"), "# new\n").unwrap();

        let changes = repo.diff_paths(tree).unwrap();
        let summary: Vec<(&str, ChangeStatus)> =
            changes.iter().map(|c| (c.path.as_str(), c.status)).collect();
        assert_eq!(
            summary,
            vec![
                ("a.txt", ChangeStatus::Modified),
                ("docs/new.md", ChangeStatus::Added),
                ("src/lib.rs", ChangeStatus::Deleted),
            ]
        );
        assert!(changes[0].base_blob.is_some());
        assert!(changes[1].base_blob.is_none());
    }

    #[test]
    fn test_write_tree_overrides_nested_paths() {
        let (_temp, repo) = init_test_repo();
        let head = repo.head_commit().unwrap();
        let base = repo.read_tree(head).unwrap();

        let blob = repo.write_blob(b"fn main() { run() }\n").unwrap();
        let tree = repo
            .write_tree(
                base,
                &[
                    TreeOverride {
                        path: "src/lib.rs".into(),
                        blob: Some(blob),
                        executable: false,
                    },
                    TreeOverride {
                        path: "a.txt".into(),
                        blob: None,
                        executable: false,
                    },
                ],
            )
            .unwrap();

        assert_eq!(repo.tree_entry(tree, "src/lib.rs").unwrap(), Some((blob, false)));
        assert_eq!(repo.tree_entry(tree, "a.txt").unwrap(), None);
        // The repository index is untouched.
        assert!(repo.inner().index().unwrap().get_path(Path::new("a.txt"), 0).is_some());
    }

    #[test]
    fn test_create_commit_does_not_move_head() {
        let (_temp, repo) = init_test_repo();
        let head = repo.head_commit().unwrap();
        let tree = repo.read_tree(head).unwrap();

        let commit = repo.create_commit(tree, &[head], "virtual").unwrap();
        assert_eq!(repo.head_commit().unwrap(), head);
        assert_eq!(repo.commits_between(head, commit).unwrap(), vec![commit]);
        assert_eq!(repo.commit_info(commit).unwrap().summary, "virtual");
        assert!(repo.is_ancestor(head, commit).unwrap());
    }

    #[test]
    fn test_write_ref_compare_and_swap() {
        let (_temp, repo) = init_test_repo();
        let head = repo.head_commit().unwrap();
        let tree = repo.read_tree(head).unwrap();
        let first = repo.create_commit(tree, &[head], "first").unwrap();
        let second = repo.create_commit(tree, &[head], "second").unwrap();

        repo.write_ref("refs/heads/feat", head, None).unwrap();
        assert!(matches!(
            repo.write_ref("refs/heads/feat", head, None),
            Err(Error::RefConflict { .. })
        ));

        // Two writers racing from the same expected value: only one wins.
        repo.write_ref("refs/heads/feat", first, Some(head)).unwrap();
        assert!(matches!(
            repo.write_ref("refs/heads/feat", second, Some(head)),
            Err(Error::RefConflict { .. })
        ));
        assert_eq!(repo.read_ref("refs/heads/feat").unwrap(), Some(first));
        assert_eq!(repo.read_ref("refs/heads/missing").unwrap(), None);
    }

    #[test]
    fn test_resolve_commit() {
        let (_temp, repo) = init_test_repo();
        let head = repo.head_commit().unwrap();
        assert_eq!(repo.resolve_commit("HEAD").unwrap(), head);
        assert!(matches!(
            repo.resolve_commit("no-such-branch"),
            Err(Error::BadRevision(_))
        ));
    }
}
