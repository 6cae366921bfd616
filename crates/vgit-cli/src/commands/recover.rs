//! `vgit recover` command - Roll back an interrupted apply or unapply.

use anyhow::Result;

use super::utils::open_workspace;
use crate::output;

/// Run the recover command.
pub fn run() -> Result<()> {
    let ws = open_workspace()?;
    match ws.recover()? {
        Some(branch) => output::success(&format!("Rolled back interrupted operation on '{branch}'")),
        None => output::info("Nothing to recover"),
    }
    Ok(())
}
