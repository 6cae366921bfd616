//! `vgit status` and `vgit list` - Show branches and their hunks.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use vgit_core::{BranchStatus, Status};

use super::utils::open_workspace;
use crate::output;

/// JSON shape of `vgit list`.
#[derive(Debug, Serialize)]
struct ListEntry<'a> {
    name: &'a str,
    status: &'a str,
    selected: bool,
    hunks: usize,
    needs_attention: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    head: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream: Option<&'a str>,
}

impl<'a> From<&'a BranchStatus> for ListEntry<'a> {
    fn from(b: &'a BranchStatus) -> Self {
        Self {
            name: b.branch.name.as_str(),
            status: b.branch.status.label(),
            selected: b.selected,
            hunks: b.records.len(),
            needs_attention: b.branch.needs_attention,
            head: b.branch.head.as_deref(),
            upstream: b.branch.upstream.as_deref(),
        }
    }
}

/// Run the status command.
pub fn run(json: bool) -> Result<()> {
    let ws = open_workspace()?;
    let status = ws.status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if status.interrupted {
        output::warn("An apply or unapply was interrupted - the next command rolls it back");
    }
    print_status(&status);
    Ok(())
}

/// Run the list command.
pub fn run_list(json: bool) -> Result<()> {
    let ws = open_workspace()?;
    let branches = ws.list()?;

    if json {
        let entries: Vec<ListEntry<'_>> = branches.iter().map(ListEntry::from).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if branches.is_empty() {
        output::info("No virtual branches yet. Use `vgit branch <name>` to create one.");
        return Ok(());
    }
    for b in &branches {
        output::essential(&format!(
            "{}  {}  {}",
            output::branch_name(&b.branch.name, b.selected),
            output::state_indicator(b.branch.status, b.branch.needs_attention),
            output::plural(b.records.len(), "hunk").dimmed()
        ));
    }
    Ok(())
}

fn print_status(status: &Status) {
    println!();
    println!("  {} {}", "Virtual branches on".bold(), status.base[..7].dimmed());
    output::hr();

    if status.branches.is_empty() {
        output::detail("  (none)");
    }
    for b in &status.branches {
        println!(
            "{}  {}  {}",
            output::branch_name(&b.branch.name, b.selected),
            output::state_indicator(b.branch.status, b.branch.needs_attention),
            output::plural(b.records.len(), "hunk").dimmed()
        );
        for hunk in &b.records {
            println!("      {}", output::hunk_line(hunk, false));
        }
    }

    if !status.unclaimed.is_empty() {
        println!();
        println!("  {}", "Unclaimed".bold());
        output::hr();
        for hunk in &status.unclaimed {
            println!("      {}", output::hunk_line(hunk, status.attention.contains(&hunk.id)));
        }
    }
    println!();
}
