//! `vgit unclaim` command - Return hunks to the unclaimed pool.

use anyhow::Result;

use super::utils::{open_workspace, parse_selectors};
use crate::output;

/// Run the unclaim command.
pub fn run(paths: &[String], hunks: &[String], all: bool) -> Result<()> {
    let ws = open_workspace()?;
    let selectors = if all { Vec::new() } else { parse_selectors(&ws, paths, hunks)? };

    let released = ws.unclaim(&selectors, all)?;
    if released.is_empty() {
        output::info("No claimed changes matched");
        return Ok(());
    }

    output::success(&format!("Unclaimed {}", output::plural(released.len(), "hunk")));
    for (hunk, owner) in &released {
        output::detail(&format!("    {}  (was '{owner}')", output::hunk_line(hunk, false)));
    }
    Ok(())
}
