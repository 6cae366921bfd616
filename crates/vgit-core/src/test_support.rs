//! Throwaway repositories for unit tests.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use vgit_git::{GitOps, Oid, Repository};

pub struct TestRepo {
    pub dir: TempDir,
    pub repo: Repository,
    pub base: Oid,
}

impl TestRepo {
    /// Repository with one commit containing `files`.
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        let raw = git2::Repository::init(dir.path()).unwrap();
        {
            let mut config = raw.config().unwrap();
            config.set_str("user.name", "Test User").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
        }

        for (path, content) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, content).unwrap();
        }

        let mut index = raw.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = raw.find_tree(tree_id).unwrap();
        let sig = raw.signature().unwrap();
        let base = raw
            .commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();
        drop(tree);

        let repo = Repository::open(dir.path()).unwrap();
        Self { dir, repo, base }
    }

    /// `line 1` .. `line n`, newline-terminated.
    pub fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn base_tree(&self) -> Oid {
        self.repo.read_tree(self.base).unwrap()
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    pub fn write(&self, rel: &str, content: &str) {
        let full = self.path(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.path(rel)).unwrap();
    }

    /// Replace 1-based lines of the working file.
    pub fn edit_lines(&self, rel: &str, edits: &[(usize, &str)]) {
        let current = self.read(rel);
        let mut lines: Vec<String> = current.split_inclusive('\n').map(String::from).collect();
        for (line, text) in edits {
            lines[line - 1] = format!("{text}\n");
        }
        self.write(rel, &lines.concat());
    }

    /// Restore a path to its base content.
    pub fn reset(&self, rel: &str) {
        let (blob, _) = self.repo.tree_entry(self.base_tree(), rel).unwrap().unwrap();
        let data = self.repo.read_blob(blob).unwrap();
        fs::write(self.path(rel), data).unwrap();
    }

    /// Content of `rel` in the base commit.
    pub fn base_content(&self, rel: &str) -> String {
        let (blob, _) = self.repo.tree_entry(self.base_tree(), rel).unwrap().unwrap();
        String::from_utf8(self.repo.read_blob(blob).unwrap()).unwrap()
    }
}
