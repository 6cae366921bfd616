//! `vgit branch`, `switch`, `rename` and `reorder` - Manage the branch store.

use anyhow::Result;

use super::utils::open_workspace;
use crate::output;

/// Create a branch, or list branches when no name is given.
pub fn run_create(name: Option<&str>) -> Result<()> {
    let Some(name) = name else {
        return super::status::run_list(false);
    };

    let ws = open_workspace()?;
    let branch = ws.create_branch(name)?;
    output::success(&format!("Created virtual branch '{}'", branch.name));
    Ok(())
}

/// Select the default target branch.
pub fn run_switch(name: &str) -> Result<()> {
    let ws = open_workspace()?;
    let name = ws.select(name)?;
    output::success(&format!("Switched to virtual branch '{name}'"));
    Ok(())
}

/// Rename a branch.
pub fn run_rename(old: &str, new: &str) -> Result<()> {
    let ws = open_workspace()?;
    ws.rename_branch(old, new)?;
    output::success(&format!("Renamed '{old}' to '{new}'"));
    Ok(())
}

/// Move a branch in the stack.
pub fn run_reorder(name: &str, position: usize) -> Result<()> {
    let ws = open_workspace()?;
    let index = ws.reorder(name, position)?;
    if index != position {
        output::warn(&format!("Position {position} is past the end of the stack"));
    }
    output::success(&format!("Moved '{name}' to position {index}"));
    Ok(())
}
