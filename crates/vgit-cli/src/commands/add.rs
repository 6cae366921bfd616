//! `vgit add` command - Claim hunks for a branch.

use anyhow::{Result, bail};

use super::utils::{open_workspace, parse_selectors};
use crate::output;

/// Run the add command.
pub fn run(paths: &[String], hunks: &[String], branch: Option<&str>) -> Result<()> {
    let ws = open_workspace()?;
    let selectors = parse_selectors(&ws, paths, hunks)?;

    let report = ws.claim(&selectors, branch)?;

    if report.created {
        output::info(&format!("Created virtual branch '{}'", report.branch));
    }
    for (hunk, owner) in &report.skipped {
        output::warn(&format!(
            "Skipped {} {} (claimed by '{owner}')",
            hunk.path,
            hunk.range_label()
        ));
    }

    if report.claimed.is_empty() {
        if report.already_owned > 0 {
            output::info(&format!("Nothing new - '{}' already owns these changes", report.branch));
            return Ok(());
        }
        bail!("No unclaimed changes matched");
    }

    output::success(&format!(
        "Claimed {} for '{}'",
        output::plural(report.claimed.len(), "hunk"),
        report.branch
    ));
    for hunk in &report.claimed {
        output::detail(&format!("    {}", output::hunk_line(hunk, false)));
    }
    Ok(())
}
