//! Trait abstractions for state storage operations.
//!
//! `StateStore` abstracts persistence of the virtual branch store so the
//! apply engine and the commit/push reconciler can be driven against any
//! backing directory.

use std::path::{Path, PathBuf};

use crate::Result;
use crate::config::Config;
use crate::state::{Journal, Store};

/// Trait for state storage operations.
#[allow(clippy::missing_errors_doc)]
pub trait StateStore {
    // === Initialization ===

    /// Check if vgit is initialized in this repository.
    fn is_initialized(&self) -> bool;

    /// Create the state directory and write the first store.
    fn init(&self, store: &Store) -> Result<()>;

    /// Get the path to the vgit directory.
    fn vgit_dir(&self) -> &Path;

    /// Path of the repository lock file.
    fn lock_path(&self) -> PathBuf;

    // === Store Operations ===

    /// Load and validate the store.
    fn load_store(&self) -> Result<Store>;

    /// Atomically replace the store on disk.
    fn save_store(&self, store: &Store) -> Result<()>;

    // === Config Operations ===

    /// Load the config, falling back to defaults.
    fn load_config(&self) -> Result<Config>;

    /// Save the config.
    fn save_config(&self, config: &Config) -> Result<()>;

    // === Journal Operations ===

    /// Load the apply journal left by an interrupted operation, if any.
    fn load_journal(&self) -> Result<Option<Journal>>;

    /// Persist the apply journal before touching the working tree.
    fn save_journal(&self, journal: &Journal) -> Result<()>;

    /// Remove the apply journal once the operation finished.
    fn clear_journal(&self) -> Result<()>;
}
