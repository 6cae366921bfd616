//! `vgit init` command - Start tracking virtual branches.

use anyhow::{Context, Result};
use vgit_core::{Error, Workspace};

use crate::output;

/// Run the init command.
pub fn run(base: Option<&str>) -> Result<()> {
    let mut ws = Workspace::open(".").context("Not inside a git repository")?;

    let base = match ws.initialize(base) {
        Ok(base) => base,
        Err(Error::AlreadyInitialized) => {
            output::warn("VGit is already initialized in this repository");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let short = base.to_string();
    output::success(&format!("Initialized vgit on {}", &short[..7]));

    let status = ws.status()?;
    if !status.unclaimed.is_empty() {
        output::info(&format!(
            "{} unclaimed - run `vgit add` to claim them",
            output::plural(status.unclaimed.len(), "hunk")
        ));
    }
    Ok(())
}
