//! Hunk index: the working tree diffed against the workspace base.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, trace};
use vgit_git::{GitOps, Oid};

use crate::config::DiffConfig;
use crate::error::{Error, Result};
use crate::hunk::{FileVersions, Hunk, HunkId, diff_file, split_by_known};

/// Base and working content of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    /// Path relative to the repository root.
    pub path: String,
    /// Blob of the path in the base tree.
    pub base_blob: Option<Oid>,
    /// Whether the base entry is executable.
    pub base_executable: bool,
    /// Base content.
    pub base: Option<Vec<u8>>,
    /// Working content.
    pub current: Option<Vec<u8>>,
    /// Whether the working copy is executable.
    pub executable: bool,
}

impl FileState {
    /// Read both versions of `path`.
    ///
    /// # Errors
    /// Returns [`Error::DiffFailure`] if the working file cannot be read.
    pub fn load<G: GitOps>(repo: &G, base_tree: Oid, path: &str) -> Result<Self> {
        let workdir = repo.workdir().ok_or(Error::NotARepository)?;
        let entry = repo.tree_entry(base_tree, path)?;
        let base = entry.map(|(blob, _)| repo.read_blob(blob)).transpose()?;
        let (current, executable) = read_workdir_file(workdir, path)?;

        Ok(Self {
            path: path.to_string(),
            base_blob: entry.map(|(blob, _)| blob),
            base_executable: entry.is_some_and(|(_, exec)| exec),
            base,
            current,
            executable,
        })
    }

    /// Whether the working copy equals the base version.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.base == self.current
    }

    fn versions(&self) -> FileVersions<'_> {
        FileVersions {
            path: &self.path,
            base_blob: self.base_blob,
            base: self.base.as_deref(),
            current: self.current.as_deref(),
            executable: self.executable,
        }
    }
}

/// Read a working file, returning `None` when it does not exist.
///
/// # Errors
/// Returns [`Error::DiffFailure`] for any read error other than not-found.
pub fn read_workdir_file(workdir: &Path, path: &str) -> Result<(Option<Vec<u8>>, bool)> {
    let full = workdir.join(path);
    match fs::read(&full) {
        Ok(data) => Ok((Some(data), is_executable(&full))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok((None, false)),
        Err(e) => Err(Error::DiffFailure {
            path: path.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

/// Every hunk currently in the working tree, with the file contents they
/// were computed from.
#[derive(Debug, Clone)]
pub struct WorkingTreeSnapshot {
    base_tree: Oid,
    hunks: Vec<Hunk>,
    files: BTreeMap<String, FileState>,
}

impl WorkingTreeSnapshot {
    /// Diff the working tree against `base_tree`.
    ///
    /// Fresh hunks that exactly tile several `known` hunks (touching edits
    /// merged by the zero-context diff) are split back into them so their
    /// ids and owners survive.
    ///
    /// # Errors
    /// Returns [`Error::DiffFailure`] if a changed path cannot be read.
    pub fn capture<G: GitOps>(
        repo: &G,
        base_tree: Oid,
        config: &DiffConfig,
        known: &[&Hunk],
    ) -> Result<Self> {
        let mut hunks = Vec::new();
        let mut files = BTreeMap::new();

        for change in repo.diff_paths(base_tree)? {
            let file = FileState::load(repo, base_tree, &change.path)?;
            if file.is_unchanged() {
                // Mode-only change; not line content.
                trace!(path = %change.path, "skipping unchanged content");
                continue;
            }

            let known_here: Vec<&Hunk> = known
                .iter()
                .copied()
                .filter(|h| h.path == change.path)
                .collect();

            for fresh in diff_file(&file.versions(), config.binary_probe_bytes)? {
                match split_by_known(&fresh, &known_here) {
                    Some(pieces) => {
                        debug!(path = %fresh.path, pieces = pieces.len(), "split merged hunk");
                        hunks.extend(pieces);
                    }
                    None => hunks.push(fresh),
                }
            }
            files.insert(change.path.clone(), file);
        }

        debug!(hunks = hunks.len(), files = files.len(), "indexed working tree");
        Ok(Self {
            base_tree,
            hunks,
            files,
        })
    }

    /// Tree the snapshot was diffed against.
    #[must_use]
    pub const fn base_tree(&self) -> Oid {
        self.base_tree
    }

    /// All hunks, ordered by path then base position.
    #[must_use]
    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    /// Consume the snapshot, keeping only the hunks.
    #[must_use]
    pub fn into_hunks(self) -> Vec<Hunk> {
        self.hunks
    }

    /// Look up a hunk by id.
    #[must_use]
    pub fn get(&self, id: &HunkId) -> Option<&Hunk> {
        self.hunks.iter().find(|h| &h.id == id)
    }

    /// Hunks on one path.
    pub fn hunks_in<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Hunk> + 'a {
        self.hunks.iter().filter(move |h| h.path == path)
    }

    /// File state of a changed path.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&FileState> {
        self.files.get(path)
    }

    /// File state of any path, reading it if the snapshot did not see a change.
    ///
    /// # Errors
    /// Returns error if the file cannot be read.
    pub fn file_or_load<G: GitOps>(&self, repo: &G, path: &str) -> Result<FileState> {
        match self.files.get(path) {
            Some(file) => Ok(file.clone()),
            None => FileState::load(repo, self.base_tree, path),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;
    use crate::hunk::HunkKind;

    #[test]
    fn test_capture_lists_hunks_per_file() {
        let t = TestRepo::new(&[("a.txt", &TestRepo::numbered(30)), ("b.txt", "keep\n")]);
        t.edit_lines("a.txt", &[(1, "one"), (21, "twenty-one")]);
        t.write("c.txt", "brand new\n");
        t.remove("b.txt");

        let snap = WorkingTreeSnapshot::capture(&t.repo, t.base_tree(), &DiffConfig::default(), &[])
            .unwrap();

        let kinds: Vec<(&str, HunkKind)> =
            snap.hunks().iter().map(|h| (h.path.as_str(), h.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("a.txt", HunkKind::Modify),
                ("a.txt", HunkKind::Modify),
                ("b.txt", HunkKind::DeleteFile),
                ("c.txt", HunkKind::AddFile),
            ]
        );
        assert_eq!(snap.hunks_in("a.txt").count(), 2);
        assert!(snap.file("c.txt").unwrap().base.is_none());
    }

    #[test]
    fn test_clean_tree_has_no_hunks() {
        let t = TestRepo::new(&[("a.txt", "x\n")]);
        let snap = WorkingTreeSnapshot::capture(&t.repo, t.base_tree(), &DiffConfig::default(), &[])
            .unwrap();
        assert!(snap.hunks().is_empty());
    }

    #[test]
    fn test_capture_splits_known_touching_hunks() {
        let t = TestRepo::new(&[("a.txt", &TestRepo::numbered(10))]);
        let config = DiffConfig::default();

        t.edit_lines("a.txt", &[(3, "three")]);
        let first = WorkingTreeSnapshot::capture(&t.repo, t.base_tree(), &config, &[])
            .unwrap()
            .into_hunks();
        t.reset("a.txt");
        t.edit_lines("a.txt", &[(4, "four")]);
        let second = WorkingTreeSnapshot::capture(&t.repo, t.base_tree(), &config, &[])
            .unwrap()
            .into_hunks();

        t.edit_lines("a.txt", &[(3, "three")]);
        let known = [&first[0], &second[0]];
        let snap = WorkingTreeSnapshot::capture(&t.repo, t.base_tree(), &config, &known).unwrap();

        let ids: Vec<&HunkId> = snap.hunks().iter().map(|h| &h.id).collect();
        assert_eq!(ids, vec![&first[0].id, &second[0].id]);
    }

    #[test]
    fn test_file_or_load_reads_unchanged_paths() {
        let t = TestRepo::new(&[("a.txt", "x\n")]);
        let snap = WorkingTreeSnapshot::capture(&t.repo, t.base_tree(), &DiffConfig::default(), &[])
            .unwrap();
        let file = snap.file_or_load(&t.repo, "a.txt").unwrap();
        assert!(file.is_unchanged());
        assert_eq!(file.current.as_deref(), Some(b"x\n".as_slice()));
    }
}
