//! `vgit log` command - Show a branch's commits.

use anyhow::Result;
use chrono::DateTime;
use colored::Colorize;
use vgit_git::CommitInfo;

use super::utils::open_workspace;
use crate::output;

/// Run the log command.
pub fn run(branch: Option<&str>, max_count: Option<usize>, oneline: bool) -> Result<()> {
    let ws = open_workspace()?;
    let (name, commits) = ws.log(branch, max_count)?;

    if commits.is_empty() {
        output::info(&format!("'{name}' has no commits yet"));
        return Ok(());
    }

    for commit in &commits {
        if oneline {
            output::essential(&oneline_entry(commit));
        } else {
            print_full(commit);
        }
    }
    Ok(())
}

fn oneline_entry(commit: &CommitInfo) -> String {
    let id = commit.id.to_string();
    format!("{} {}", id[..7].yellow(), commit.summary)
}

fn print_full(commit: &CommitInfo) {
    println!("{} {}", "commit".yellow(), commit.id.to_string().yellow());
    println!("Author: {}", commit.author);
    if let Some(date) = DateTime::from_timestamp(commit.time, 0) {
        println!("Date:   {}", date.format("%a %b %e %H:%M:%S %Y %z"));
    }
    println!();
    println!("    {}", commit.summary);
    println!();
}
