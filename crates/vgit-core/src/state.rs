//! State persistence for the .git/vgit/ directory.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vgit_git::Oid;

use crate::BranchName;
use crate::branch::{ApplyState, BranchStore};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ownership::OwnershipMap;
use crate::traits::StateStore;

/// Current on-disk format of `state.json`.
pub const STATE_VERSION: u32 = 1;

/// Everything vgit persists about the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Format version.
    pub version: u32,

    /// Commit every hunk is computed against.
    pub base: String,

    /// Default target branch for claims, commits and pushes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<BranchName>,

    /// Virtual branches in stack order.
    #[serde(default)]
    pub branches: BranchStore,

    /// Hunk records and claims.
    #[serde(default)]
    pub ownership: OwnershipMap,
}

impl Store {
    /// Create an empty store on `base`.
    #[must_use]
    pub fn new(base: Oid) -> Self {
        Self {
            version: STATE_VERSION,
            base: base.to_string(),
            selected: None,
            branches: BranchStore::new(),
            ownership: OwnershipMap::new(),
        }
    }

    /// Base commit id.
    ///
    /// # Errors
    /// Returns a description if the id is malformed.
    pub fn base_id(&self) -> std::result::Result<Oid, String> {
        Oid::from_str(&self.base).map_err(|_| format!("invalid base commit '{}'", self.base))
    }

    /// Check every cross-reference in the store.
    ///
    /// # Errors
    /// Returns a description of the first broken invariant.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.version > STATE_VERSION {
            return Err(format!(
                "state version {} is newer than supported version {STATE_VERSION}",
                self.version
            ));
        }
        self.base_id()?;

        let mut names: Vec<&str> = self.branches.all().iter().map(|b| b.name.as_str()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(format!("duplicate branch name '{}'", dup[0]));
        }

        if let Some(selected) = &self.selected {
            if self.branches.get(selected).is_none() {
                return Err(format!("selected branch '{selected}' does not exist"));
            }
        }

        self.ownership.validate(&self.branches)
    }
}

/// Record of an in-flight apply or unapply.
///
/// Written before any working file is touched; its presence at startup
/// means the operation was interrupted and must be rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    /// Branch being applied or unapplied.
    pub branch: BranchName,

    /// Stable state before the operation started.
    pub prior: ApplyState,

    /// When the operation started.
    pub started_at: DateTime<Utc>,

    /// Pre-images of every path the operation writes.
    pub files: Vec<JournalEntry>,
}

/// Pre-image of one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Path relative to the repository root.
    pub path: String,

    /// Blob holding the original content, `None` if the path did not exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_image: Option<String>,

    /// Whether the original file was executable.
    #[serde(default)]
    pub executable: bool,
}

/// Manages the .git/vgit/ directory state.
#[derive(Debug)]
pub struct State {
    /// Path to the .git/vgit/ directory.
    vgit_dir: PathBuf,
}

impl State {
    /// File names within .git/vgit/
    const STATE_FILE: &'static str = "state.json";
    const JOURNAL_FILE: &'static str = "journal.json";
    const CONFIG_FILE: &'static str = "config.toml";
    const LOCK_FILE: &'static str = "lock";

    /// Create a State for the repository whose git directory is `git_dir`.
    ///
    /// # Errors
    /// Returns error if `git_dir` does not exist.
    pub fn new(git_dir: impl AsRef<Path>) -> Result<Self> {
        let git_dir = git_dir.as_ref();
        if !git_dir.is_dir() {
            return Err(Error::NotARepository);
        }

        Ok(Self {
            vgit_dir: git_dir.join("vgit"),
        })
    }

    fn state_path(&self) -> PathBuf {
        self.vgit_dir.join(Self::STATE_FILE)
    }

    fn journal_path(&self) -> PathBuf {
        self.vgit_dir.join(Self::JOURNAL_FILE)
    }

    fn config_path(&self) -> PathBuf {
        self.vgit_dir.join(Self::CONFIG_FILE)
    }

    fn corrupt(path: PathBuf, reason: impl Into<String>) -> Error {
        Error::CorruptState {
            file: path,
            reason: reason.into(),
        }
    }

    /// Load the store for a read-only command.
    ///
    /// Readers do not take the lock, so a failed load is retried once in case
    /// it raced a writer.
    ///
    /// # Errors
    /// Returns [`Error::CorruptState`] if the second attempt fails too.
    pub fn load_store_consistent(&self) -> Result<Store> {
        match self.load_store() {
            Err(Error::CorruptState { reason, .. }) => {
                debug!(%reason, "state unreadable, retrying once");
                thread::sleep(Duration::from_millis(50));
                self.load_store()
            }
            other => other,
        }
    }
}

impl StateStore for State {
    fn is_initialized(&self) -> bool {
        self.state_path().is_file()
    }

    fn init(&self, store: &Store) -> Result<()> {
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }
        fs::create_dir_all(&self.vgit_dir)?;
        self.save_store(store)?;
        if !self.config_path().exists() {
            self.save_config(&Config::default())?;
        }
        Ok(())
    }

    fn vgit_dir(&self) -> &Path {
        &self.vgit_dir
    }

    fn lock_path(&self) -> PathBuf {
        self.vgit_dir.join(Self::LOCK_FILE)
    }

    fn load_store(&self) -> Result<Store> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }

        let path = self.state_path();
        let content = fs::read_to_string(&path)?;
        let store: Store =
            serde_json::from_str(&content).map_err(|e| Self::corrupt(path.clone(), e.to_string()))?;
        store.validate().map_err(|reason| Self::corrupt(path, reason))?;
        Ok(store)
    }

    fn save_store(&self, store: &Store) -> Result<()> {
        let content = serde_json::to_string_pretty(store)?;
        write_atomic(&self.state_path(), content.as_bytes(), None)
    }

    fn load_config(&self) -> Result<Config> {
        Config::load(self.config_path())
    }

    fn save_config(&self, config: &Config) -> Result<()> {
        config.save(self.config_path())
    }

    fn load_journal(&self) -> Result<Option<Journal>> {
        let path = self.journal_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Self::corrupt(path, e.to_string()))
    }

    fn save_journal(&self, journal: &Journal) -> Result<()> {
        let content = serde_json::to_string_pretty(journal)?;
        write_atomic(&self.journal_path(), content.as_bytes(), None)
    }

    fn clear_journal(&self) -> Result<()> {
        match fs::remove_file(self.journal_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Replace `path` with `data` via a synced sibling temp file and rename.
///
/// `executable` sets the file mode on unix; `None` leaves the default.
///
/// # Errors
/// Returns error if the temp file cannot be written or renamed.
pub fn write_atomic(path: &Path, data: &[u8], executable: Option<bool>) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    if let Some(executable) = executable {
        set_mode(tmp.path(), path, executable)?;
    }
    tmp.persist(path).map_err(|e| {
        warn!(path = %path.display(), "atomic rename failed");
        Error::Io(e.error)
    })?;
    Ok(())
}

/// Give `tmp` the permissions of the file it replaces, toggling only the
/// exec bits. A new file gets 0644 or 0755.
#[cfg(unix)]
fn set_mode(tmp: &Path, target: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = match fs::metadata(target) {
        Ok(meta) => exec_bits(meta.permissions().mode() & 0o7777, executable),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if executable { 0o755 } else { 0o644 }
        }
        Err(e) => return Err(e.into()),
    };
    fs::set_permissions(tmp, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_tmp: &Path, _target: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

/// Exec bits follow the read bits, as git does on checkout.
#[cfg(unix)]
const fn exec_bits(mode: u32, executable: bool) -> u32 {
    if executable {
        mode | ((mode & 0o444) >> 2)
    } else {
        mode & !0o111
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::branch::VirtualBranch;
    use tempfile::TempDir;

    fn setup_test_repo() -> (TempDir, State) {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let state = State::new(temp.path().join(".git")).unwrap();
        (temp, state)
    }

    fn store_with(names: &[&str]) -> Store {
        let mut store = Store::new(Oid::zero());
        for n in names {
            store
                .branches
                .create(VirtualBranch::new(BranchName::new(*n).unwrap(), Oid::zero()))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_init_and_check() {
        let (_temp, state) = setup_test_repo();

        assert!(!state.is_initialized());
        assert!(matches!(state.load_store(), Err(Error::NotInitialized)));

        state.init(&Store::new(Oid::zero())).unwrap();
        assert!(state.is_initialized());
        assert!(state.vgit_dir().join("config.toml").exists());
        assert!(matches!(
            state.init(&Store::new(Oid::zero())),
            Err(Error::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_store_persistence() {
        let (_temp, state) = setup_test_repo();
        let mut store = store_with(&["feat-x", "feat-y"]);
        store.selected = Some(BranchName::new("feat-y").unwrap());
        state.init(&store).unwrap();

        let loaded = state.load_store().unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.branches.all()[1].name, "feat-y");
    }

    #[test]
    fn test_unparseable_state_is_corrupt() {
        let (_temp, state) = setup_test_repo();
        state.init(&Store::new(Oid::zero())).unwrap();
        fs::write(state.vgit_dir().join("state.json"), "{ not json").unwrap();

        assert!(matches!(state.load_store(), Err(Error::CorruptState { .. })));
        assert!(matches!(
            state.load_store_consistent(),
            Err(Error::CorruptState { .. })
        ));
    }

    #[test]
    fn test_unknown_selected_branch_is_corrupt() {
        let (_temp, state) = setup_test_repo();
        state.init(&Store::new(Oid::zero())).unwrap();

        let mut store = store_with(&["feat-x"]);
        store.selected = Some(BranchName::new("ghost").unwrap());
        state.save_store(&store).unwrap();

        let err = state.load_store().unwrap_err();
        assert!(matches!(err, Error::CorruptState { ref reason, .. } if reason.contains("ghost")));
    }

    #[test]
    fn test_duplicate_branch_is_corrupt() {
        let (_temp, state) = setup_test_repo();
        state.init(&Store::new(Oid::zero())).unwrap();

        let branch = serde_json::to_value(VirtualBranch::new(
            BranchName::new("dup").unwrap(),
            Oid::zero(),
        ))
        .unwrap();
        let doc = serde_json::json!({
            "version": 1,
            "base": Oid::zero().to_string(),
            "branches": [branch.clone(), branch],
        });
        fs::write(state.vgit_dir().join("state.json"), doc.to_string()).unwrap();

        assert!(matches!(state.load_store(), Err(Error::CorruptState { .. })));
    }

    #[test]
    fn test_journal_lifecycle() {
        let (_temp, state) = setup_test_repo();
        state.init(&Store::new(Oid::zero())).unwrap();
        assert!(state.load_journal().unwrap().is_none());

        let journal = Journal {
            branch: BranchName::new("feat-x").unwrap(),
            prior: ApplyState::Unapplied,
            started_at: Utc::now(),
            files: vec![JournalEntry {
                path: "a.txt".into(),
                pre_image: None,
                executable: false,
            }],
        };
        state.save_journal(&journal).unwrap();
        assert_eq!(state.load_journal().unwrap(), Some(journal));

        state.clear_journal().unwrap();
        state.clear_journal().unwrap();
        assert!(state.load_journal().unwrap().is_none());
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/file.txt");
        write_atomic(&path, b"one", None).unwrap();
        write_atomic(&path, b"two", Some(true)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");

        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;
        let mode_of = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o7777;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secret.txt");
        fs::write(&path, "one\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        write_atomic(&path, b"two\n", Some(false)).unwrap();
        assert_eq!(mode_of(&path), 0o600);
        write_atomic(&path, b"three\n", Some(true)).unwrap();
        assert_eq!(mode_of(&path), 0o700);
        write_atomic(&path, b"four\n", Some(false)).unwrap();
        assert_eq!(mode_of(&path), 0o600);

        let fresh = temp.path().join("fresh.sh");
        write_atomic(&fresh, b"#!/bin/sh\n", Some(true)).unwrap();
        assert_eq!(mode_of(&fresh), 0o755);
    }
}
