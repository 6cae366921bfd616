//! `vgit apply` / `vgit unapply` - Move a branch in or out of the working tree.

use anyhow::Result;
use vgit_core::ApplyReport;

use super::utils::open_workspace;
use crate::output;

/// Put a stashed branch back into the working tree.
pub fn run_apply(name: &str) -> Result<()> {
    let ws = open_workspace()?;
    let report = ws.apply(name)?;
    print(&report, "applied", "Applied");
    Ok(())
}

/// Take a branch out of the working tree.
pub fn run_unapply(name: &str) -> Result<()> {
    let ws = open_workspace()?;
    let report = ws.unapply(name)?;
    print(&report, "unapplied", "Unapplied");
    Ok(())
}

fn print(report: &ApplyReport, state: &str, verb: &str) {
    if report.unchanged {
        output::info(&format!("'{}' is already {state}", report.branch));
        return;
    }
    output::success(&format!(
        "{verb} '{}' ({})",
        report.branch,
        output::plural(report.files.len(), "file")
    ));
    for path in &report.files {
        output::detail(&format!("    {path}"));
    }
}
