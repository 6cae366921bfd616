use std::io::IsTerminal;

use anyhow::{Context, Result, bail};
use inquire::Confirm;
use tracing::debug;
use vgit_core::{Selector, Workspace};

/// Open the workspace for the current directory and ensure it is initialized.
pub fn open_workspace() -> Result<Workspace> {
    let ws = Workspace::open(".").context("Not inside a git repository")?;
    if !ws.is_initialized() {
        bail!("VGit not initialized - run `vgit init` first");
    }
    debug!(config = ?ws.config(), "opened workspace");
    Ok(ws)
}

/// Parse positional selectors relative to the current directory, plus
/// `--hunk` id prefixes.
pub fn parse_selectors(ws: &Workspace, paths: &[String], hunks: &[String]) -> Result<Vec<Selector>> {
    let cwd = std::env::current_dir().context("Cannot read current directory")?;
    let prefix = ws.relative_prefix(&cwd)?;

    let mut selectors = paths
        .iter()
        .map(|p| Selector::parse_in(p, &prefix))
        .collect::<vgit_core::Result<Vec<_>>>()?;
    selectors.extend(hunks.iter().map(|h| Selector::Hunk(h.clone())));
    Ok(selectors)
}

/// Ask a yes/no question. Without a terminal the answer is `false`.
pub fn confirm(question: &str) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Ok(false);
    }
    Confirm::new(question)
        .with_default(false)
        .prompt()
        .context("Confirmation cancelled")
}
