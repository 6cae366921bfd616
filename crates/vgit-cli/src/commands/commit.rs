//! `vgit commit` command - Commit one branch's hunks.

use anyhow::{Result, bail};

use super::utils::open_workspace;
use crate::output;

/// Run the commit command.
pub fn run(message: &str, branch: Option<&str>) -> Result<()> {
    if message.trim().is_empty() {
        bail!("Commit message cannot be empty");
    }

    let ws = open_workspace()?;
    let (name, outcome) = ws.commit(branch, message)?;

    let id = outcome.commit.to_string();
    output::success(&format!(
        "[{name} {}] {}",
        &id[..7],
        message.lines().next().unwrap_or_default()
    ));
    output::detail(&format!(
        "    {}, {}",
        output::plural(outcome.files, "file"),
        output::plural(outcome.hunks, "hunk")
    ));
    Ok(())
}
