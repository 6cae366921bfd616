//! Hunk selectors used by `add` and `unclaim`.
//!
//! Grammar:
//!
//! ```text
//! .            every hunk
//! src/         every hunk under a directory
//! src/lib.rs   every hunk in a file
//! a.txt:7      the hunk covering working-file line 7
//! a.txt:1..5   hunks intersecting lines 1 through 5
//! ```
//!
//! Hunk ids are selected separately with `--hunk <prefix>`.

use std::fmt;

use crate::error::{Error, Result};
use crate::hunk::Hunk;

/// A parsed hunk selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Every hunk in the repository.
    All,
    /// Every hunk in a file or under a directory.
    Path(String),
    /// Hunks of one file intersecting an inclusive 1-based line range.
    Lines {
        /// File path.
        path: String,
        /// First line.
        start: u32,
        /// Last line.
        end: u32,
    },
    /// A hunk id or unique id prefix.
    Hunk(String),
}

impl Selector {
    /// Parse a repository-relative selector.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSelector`] for malformed line ranges or paths
    /// that leave the repository.
    pub fn parse(input: &str) -> Result<Self> {
        Self::parse_in(input, "")
    }

    /// Parse a selector given relative to `prefix`, a repository-relative
    /// directory (usually the current directory).
    ///
    /// # Errors
    /// Returns [`Error::InvalidSelector`] as for [`parse`](Self::parse).
    pub fn parse_in(input: &str, prefix: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidSelector {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (raw_path, range) = match input.rsplit_once(':') {
            Some((path, range)) if !range.is_empty() && range.starts_with(|c: char| c.is_ascii_digit()) => {
                (path, Some(parse_range(range).ok_or_else(|| invalid("expected N or N..M"))?))
            }
            _ => (input, None),
        };

        let path = normalize(prefix, raw_path).ok_or_else(|| invalid("path leaves the repository"))?;

        match range {
            Some(_) if path.is_empty() => Err(invalid("line ranges need a file path")),
            Some((start, end)) => {
                if start == 0 || end < start {
                    return Err(invalid("lines are 1-based and N must not exceed M"));
                }
                Ok(Self::Lines { path, start, end })
            }
            None if path.is_empty() => Ok(Self::All),
            None => Ok(Self::Path(path)),
        }
    }

    /// Whether a hunk falls under this selector.
    ///
    /// [`Selector::Hunk`] never matches here; it is resolved against the
    /// ownership map instead.
    #[must_use]
    pub fn matches(&self, hunk: &Hunk) -> bool {
        match self {
            Self::All => true,
            Self::Path(path) => {
                hunk.path == *path
                    || hunk
                        .path
                        .strip_prefix(path.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Self::Lines { path, start, end } => {
                if hunk.path != *path {
                    return false;
                }
                if hunk.kind.is_whole_file() {
                    return true;
                }
                let (lo, hi) = hunk.new_line_span();
                lo <= *end && *start <= hi
            }
            Self::Hunk(_) => false,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("."),
            Self::Path(path) => f.write_str(path),
            Self::Lines { path, start, end } if start == end => write!(f, "{path}:{start}"),
            Self::Lines { path, start, end } => write!(f, "{path}:{start}..{end}"),
            Self::Hunk(prefix) => write!(f, "hunk {prefix}"),
        }
    }
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once("..") {
        Some((a, b)) => Some((a.parse().ok()?, b.parse().ok()?)),
        None => {
            let n = range.parse().ok()?;
            Some((n, n))
        }
    }
}

/// Join `path` onto `prefix` and resolve `.`/`..`; `None` if it escapes.
fn normalize(prefix: &str, path: &str) -> Option<String> {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{prefix}/{path}")
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}
