//! `vgit completions` - Shell completion scripts.

use std::io::{self, Write};

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{Shell, generate};

use super::Cli;

/// Write the completion script for `shell` to stdout.
pub fn run(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let mut out = io::stdout().lock();
    generate(shell, &mut cmd, name, &mut out);
    out.flush()?;
    Ok(())
}
