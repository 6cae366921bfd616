//! Terminal output formatting utilities.

use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use vgit_core::{ApplyState, Hunk};

static QUIET_MODE: AtomicBool = AtomicBool::new(false);

/// Set quiet mode globally. Call once at startup.
pub fn set_quiet(quiet: bool) {
    QUIET_MODE.store(quiet, Ordering::Relaxed);
}

fn is_quiet() -> bool {
    QUIET_MODE.load(Ordering::Relaxed)
}

/// Print a success message (suppressed in quiet mode).
pub fn success(msg: &str) {
    if !is_quiet() {
        println!("{} {}", "✓".green(), msg);
    }
}

/// Print an error message (always prints to stderr).
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a warning message (always prints to stderr).
pub fn warn(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Print an info message (suppressed in quiet mode).
pub fn info(msg: &str) {
    if !is_quiet() {
        println!("{} {}", "→".blue(), msg);
    }
}

/// Print a detail line without prefix (suppressed in quiet mode).
pub fn detail(msg: &str) {
    if !is_quiet() {
        println!("{msg}");
    }
}

/// Print essential machine-readable output (always prints).
pub fn essential(msg: &str) {
    println!("{msg}");
}

/// Indicator for a branch's apply state.
#[must_use]
pub fn state_indicator(state: ApplyState, needs_attention: bool) -> String {
    let dot = match state {
        ApplyState::Applied if needs_attention => "●".yellow(),
        ApplyState::Applied => "●".green(),
        ApplyState::Unapplied => "○".dimmed(),
        ApplyState::Applying | ApplyState::Unapplying => "●".red(),
    };
    format!("{dot} {}", state.label())
}

/// Colored branch name with selection marker.
#[must_use]
pub fn branch_name(name: &str, is_selected: bool) -> String {
    if is_selected {
        format!("{} {}", "▶".cyan(), name.cyan().bold())
    } else {
        format!("  {name}")
    }
}

/// One hunk as `<id> <path> <range> (+a -r)`.
#[must_use]
pub fn hunk_line(hunk: &Hunk, needs_attention: bool) -> String {
    let mut line = format!(
        "{}  {} {}  {}{}",
        hunk.id.short().yellow(),
        hunk.path,
        hunk.range_label().dimmed(),
        format!("+{}", hunk.added.len()).green(),
        format!(" -{}", hunk.removed.len()).red(),
    );
    if needs_attention {
        line.push_str(&format!("  {}", "(needs attention)".yellow()));
    }
    line
}

/// `1 hunk`, `3 hunks`.
#[must_use]
pub fn plural(n: usize, word: &str) -> String {
    if n == 1 { format!("{n} {word}") } else { format!("{n} {word}s") }
}

/// Print a horizontal line (suppressed in quiet mode).
pub fn hr() {
    if !is_quiet() {
        println!("{}", "─".repeat(50).dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_indicator_labels() {
        assert!(state_indicator(ApplyState::Applied, false).contains("applied"));
        assert!(state_indicator(ApplyState::Unapplied, false).contains("unapplied"));
        assert!(state_indicator(ApplyState::Applying, false).contains("applying"));
    }

    #[test]
    fn test_state_indicator_attention_color() {
        colored::control::set_override(true);
        assert_ne!(
            state_indicator(ApplyState::Applied, true),
            state_indicator(ApplyState::Applied, false)
        );
        colored::control::set_override(false);
    }

    #[test]
    fn test_branch_name_selected() {
        let name = branch_name("feat-x", true);
        assert!(name.contains("feat-x"));
        assert!(name.contains('▶'));
    }

    #[test]
    fn test_branch_name_not_selected() {
        let name = branch_name("feat-x", false);
        assert!(name.contains("feat-x"));
        assert!(!name.contains('▶'));
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1, "hunk"), "1 hunk");
        assert_eq!(plural(0, "hunk"), "0 hunks");
        assert_eq!(plural(2, "file"), "2 files");
    }

    #[test]
    fn test_quiet_mode() {
        set_quiet(true);
        assert!(is_quiet());
        set_quiet(false);
        assert!(!is_quiet());
    }
}
