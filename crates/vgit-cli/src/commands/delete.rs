//! `vgit delete` command - Delete a virtual branch.

use anyhow::Result;
use vgit_core::Error;

use super::utils::{confirm, open_workspace};
use crate::output;

/// Run the delete command.
///
/// Without `--force`, a branch that still claims hunks is only deleted after
/// an interactive confirmation.
pub fn run(name: &str, force: bool) -> Result<()> {
    let ws = open_workspace()?;

    let report = match ws.delete_branch(name, force) {
        Ok(report) => report,
        Err(Error::BranchNotEmpty { name, claimed }) => {
            let question = format!(
                "'{name}' claims {}. Delete it and return them to unclaimed?",
                output::plural(claimed, "hunk")
            );
            if !confirm(&question)? {
                return Err(Error::BranchNotEmpty { name, claimed }.into());
            }
            ws.delete_branch(&name, true)?
        }
        Err(e) => return Err(e.into()),
    };

    if report.reapplied {
        output::info(&format!("Applied '{}' so its changes stay in the working tree", report.branch));
    }
    if report.released > 0 {
        output::info(&format!("{} returned to unclaimed", output::plural(report.released, "hunk")));
    }
    output::success(&format!("Deleted virtual branch '{}'", report.branch));
    Ok(())
}
