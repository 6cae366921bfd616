//! `vgit push` command - Publish a branch to the remote.

use anyhow::Result;

use super::utils::{confirm, open_workspace};
use crate::output;

/// Run the push command.
pub fn run(branch: Option<&str>, remote: Option<&str>, force: bool, integrated: bool, yes: bool) -> Result<()> {
    let ws = open_workspace()?;

    let integrated = integrated
        && (yes || confirm("Delete the branch after pushing? Its hunks return to unclaimed")?);

    let (name, report) = ws.push(branch, remote, force, integrated)?;
    let outcome = &report.outcome;
    let id = outcome.commit.to_string();

    if outcome.first_push {
        output::success(&format!(
            "Pushed '{name}' to {}/{} (new branch)",
            outcome.remote, outcome.remote_branch
        ));
    } else {
        output::success(&format!("Pushed '{name}' to {}/{}", outcome.remote, outcome.remote_branch));
    }
    output::essential(&id);

    if let Some(deleted) = &report.deleted {
        output::info(&format!(
            "Deleted '{}' as integrated ({} returned to unclaimed)",
            deleted.branch,
            output::plural(deleted.released, "hunk")
        ));
    }
    Ok(())
}
