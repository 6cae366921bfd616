//! Hunks: the addressable change units virtual branches claim.
//!
//! A hunk is a maximal run of changed lines between the workspace base and
//! the working copy of one file, computed with zero lines of context. Its id
//! is a content hash (path, base blob, changed lines), never a position, so
//! edits elsewhere in the file leave it intact.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use similar::{Algorithm, DiffTag};
use vgit_git::Oid;

use crate::error::{Error, Result};

/// Content-derived hunk identifier (40 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HunkId(String);

impl HunkId {
    /// Wrap an object id.
    #[must_use]
    pub fn from_oid(oid: Oid) -> Self {
        Self(oid.to_string())
    }

    /// Full id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated id for display.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }

    /// Whether `prefix` abbreviates this id.
    #[must_use]
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.starts_with(prefix)
    }
}

impl fmt::Display for HunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

/// What a hunk does to its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HunkKind {
    /// A run of changed lines inside an existing text file.
    Modify,
    /// The whole file is new.
    AddFile,
    /// The whole file is removed.
    DeleteFile,
    /// Binary content replaced as a unit.
    Binary,
}

impl HunkKind {
    /// Whether the hunk stands for the entire file.
    #[must_use]
    pub const fn is_whole_file(self) -> bool {
        !matches!(self, Self::Modify)
    }

    const fn tag(self) -> &'static str {
        match self {
            Self::Modify => "modify",
            Self::AddFile => "add",
            Self::DeleteFile => "delete",
            Self::Binary => "binary",
        }
    }
}

/// One change unit of the working-tree diff.
///
/// Line ranges are 0-based. `old_*` indexes the base file, `new_*` the
/// working file at the time the hunk was computed. Lines keep their
/// terminators so files can be rebuilt byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    /// Content-derived identifier.
    pub id: HunkId,
    /// File path relative to the repository root.
    pub path: String,
    /// What the hunk does.
    pub kind: HunkKind,
    /// Blob of the path in the base tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_blob: Option<String>,
    /// First base line touched (insertion point for pure additions).
    pub old_start: u32,
    /// Number of base lines removed.
    pub old_lines: u32,
    /// First working-file line of the replacement.
    pub new_start: u32,
    /// Number of lines added.
    pub new_lines: u32,
    /// Base lines removed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    /// Lines added.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    /// Whole new content of a binary hunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_blob: Option<String>,
    /// Executable bit of an added file.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub executable: bool,
}

impl Hunk {
    /// One past the last base line touched.
    #[must_use]
    pub const fn old_end(&self) -> u32 {
        self.old_start + self.old_lines
    }

    /// Base blob as an object id.
    #[must_use]
    pub fn base_blob_id(&self) -> Option<Oid> {
        self.base_blob.as_deref().and_then(|s| Oid::from_str(s).ok())
    }

    /// New binary content as an object id.
    #[must_use]
    pub fn new_blob_id(&self) -> Option<Oid> {
        self.new_blob.as_deref().and_then(|s| Oid::from_str(s).ok())
    }

    /// Inclusive 1-based working-file lines this hunk covers.
    ///
    /// Pure deletions cover the line the removed block used to precede.
    #[must_use]
    pub fn new_line_span(&self) -> (u32, u32) {
        if self.new_lines == 0 {
            let at = self.new_start.max(1);
            (at, at)
        } else {
            (self.new_start + 1, self.new_start + self.new_lines)
        }
    }

    /// Short human label for the region, e.g. `L3-7` or `whole file`.
    #[must_use]
    pub fn range_label(&self) -> String {
        match self.kind {
            HunkKind::Modify => {
                let (lo, hi) = self.new_line_span();
                if self.new_lines == 0 {
                    format!("L{lo} (-{})", self.old_lines)
                } else if lo == hi {
                    format!("L{lo}")
                } else {
                    format!("L{lo}-{hi}")
                }
            }
            HunkKind::AddFile => "new file".into(),
            HunkKind::DeleteFile => "deleted".into(),
            HunkKind::Binary => "binary".into(),
        }
    }

    /// Whether two hunks cannot both be applied to the same base file.
    ///
    /// Whole-file hunks exclude everything else on their path. Two pure
    /// insertions at the same base line do not overlap; their relative order
    /// is fixed by [`composition_order`].
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        if self.path != other.path {
            return false;
        }
        if self.kind.is_whole_file() || other.kind.is_whole_file() {
            return true;
        }

        let (a0, a1) = (self.old_start, self.old_end());
        let (b0, b1) = (other.old_start, other.old_end());
        match (a0 == a1, b0 == b1) {
            (true, true) => false,
            (true, false) => b0 < a0 && a0 < b1,
            (false, true) => a0 < b0 && b0 < a1,
            (false, false) => a0 < b1 && b0 < a1,
        }
    }

    /// Whether two hunks overlap or sit directly next to each other.
    #[must_use]
    pub fn touches(&self, other: &Self) -> bool {
        self.path == other.path
            && (self.overlaps(other)
                || (self.old_start <= other.old_end() && other.old_start <= self.old_end()))
    }
}

/// Base and working versions of one file, input to [`diff_file`].
#[derive(Debug, Clone, Copy)]
pub struct FileVersions<'a> {
    /// Path relative to the repository root.
    pub path: &'a str,
    /// Blob id of the base version.
    pub base_blob: Option<Oid>,
    /// Base content, `None` if absent from the base tree.
    pub base: Option<&'a [u8]>,
    /// Working content, `None` if absent on disk.
    pub current: Option<&'a [u8]>,
    /// Whether the working copy is executable.
    pub executable: bool,
}

/// Whether content should be treated as binary.
#[must_use]
pub fn is_binary(data: &[u8], probe_bytes: usize) -> bool {
    let probe = &data[..data.len().min(probe_bytes)];
    probe.contains(&0) || std::str::from_utf8(data).is_err()
}

/// Split text into lines, keeping each terminator.
#[must_use]
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Diff one file into hunks, ordered by base position.
///
/// # Errors
/// Returns [`Error::DiffFailure`] if content hashing fails.
pub fn diff_file(versions: &FileVersions<'_>, probe_bytes: usize) -> Result<Vec<Hunk>> {
    let mut builder = HunkBuilder::new(versions);

    match (versions.base, versions.current) {
        (None, None) => {}
        (Some(base), Some(current)) if base == current => {}
        (Some(base), None) => {
            let removed = text_lines(base, probe_bytes);
            builder.push(HunkKind::DeleteFile, 0, to_u32(removed.len()), 0, removed, vec![], None)?;
        }
        (base, Some(current))
            if is_binary(current, probe_bytes) || base.is_some_and(|b| is_binary(b, probe_bytes)) =>
        {
            let new_blob = vgit_git::hash_blob(current).map_err(|e| builder.failure(&e))?;
            builder.push(HunkKind::Binary, 0, 0, 0, vec![], vec![], Some(new_blob))?;
        }
        (None, Some(current)) => {
            let added = text_lines(current, probe_bytes);
            builder.push(HunkKind::AddFile, 0, 0, 0, vec![], added, None)?;
        }
        (Some(base), Some(current)) => {
            let (base, current) = (utf8(base), utf8(current));
            let old = split_lines(base);
            let new = split_lines(current);

            for (old_range, new_range) in changed_runs(&old, &new) {
                builder.push(
                    HunkKind::Modify,
                    to_u32(old_range.start),
                    to_u32(old_range.len()),
                    to_u32(new_range.start),
                    owned(&old[old_range]),
                    owned(&new[new_range]),
                    None,
                )?;
            }
        }
    }

    Ok(builder.hunks)
}

/// Maximal runs of non-equal diff ops as (old range, new range) pairs.
fn changed_runs(
    old: &[&str],
    new: &[&str],
) -> Vec<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let mut runs: Vec<(std::ops::Range<usize>, std::ops::Range<usize>)> = Vec::new();
    let mut pending: Option<(std::ops::Range<usize>, std::ops::Range<usize>)> = None;

    for op in similar::capture_diff_slices(Algorithm::Myers, old, new) {
        if op.tag() == DiffTag::Equal {
            runs.extend(pending.take());
            continue;
        }
        let (o, n) = (op.old_range(), op.new_range());
        pending = Some(match pending {
            Some((po, pn)) => (po.start..o.end, pn.start..n.end),
            None => (o, n),
        });
    }
    runs.extend(pending);
    runs
}

/// Accumulates hunks for one file and assigns their ids.
struct HunkBuilder<'a> {
    versions: &'a FileVersions<'a>,
    hunks: Vec<Hunk>,
    seen: HashMap<Oid, u32>,
}

impl<'a> HunkBuilder<'a> {
    fn new(versions: &'a FileVersions<'a>) -> Self {
        Self {
            versions,
            hunks: Vec::new(),
            seen: HashMap::new(),
        }
    }

    fn failure(&self, e: &vgit_git::Error) -> Error {
        Error::DiffFailure {
            path: self.versions.path.to_string(),
            reason: e.to_string(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        kind: HunkKind,
        old_start: u32,
        old_lines: u32,
        new_start: u32,
        removed: Vec<String>,
        added: Vec<String>,
        new_blob: Option<Oid>,
    ) -> Result<()> {
        let base_blob = self.versions.base_blob.map(|b| b.to_string());
        let new_blob = new_blob.map(|b| b.to_string());

        let mut key = Vec::new();
        for part in [
            self.versions.path,
            base_blob.as_deref().unwrap_or("-"),
            kind.tag(),
            new_blob.as_deref().unwrap_or("-"),
        ] {
            key.extend_from_slice(part.as_bytes());
            key.push(0);
        }
        for line in &removed {
            key.push(b'-');
            key.extend_from_slice(line.as_bytes());
        }
        key.push(0);
        for line in &added {
            key.push(b'+');
            key.extend_from_slice(line.as_bytes());
        }

        // Identical changes in one file are told apart by occurrence.
        let content = vgit_git::hash_blob(&key).map_err(|e| self.failure(&e))?;
        let occurrence = self.seen.entry(content).or_insert(0);
        key.push(0);
        key.extend_from_slice(occurrence.to_string().as_bytes());
        *occurrence += 1;
        let id = vgit_git::hash_blob(&key).map_err(|e| self.failure(&e))?;

        self.hunks.push(Hunk {
            id: HunkId::from_oid(id),
            path: self.versions.path.to_string(),
            kind,
            base_blob,
            old_start,
            old_lines,
            new_start,
            new_lines: to_u32(added.len()),
            removed,
            added,
            new_blob,
            executable: kind == HunkKind::AddFile && self.versions.executable,
        });
        Ok(())
    }
}

/// Sort key for composing hunks onto one base file.
///
/// Hunks go in base order. At the same base line pure insertions come before
/// replacements, and insertions from different owners follow stack order
/// (`rank`, lower first; unclaimed hunks use `usize::MAX`).
#[must_use]
pub fn composition_order(hunk: &Hunk, rank: usize) -> (u32, bool, usize, String) {
    (hunk.old_start, hunk.old_lines > 0, rank, hunk.id.0.clone())
}

/// Rebuild a text file from its base plus non-overlapping line hunks.
///
/// `hunks` must already be in [`composition_order`]. Returns `None` when a
/// hunk does not fit: ranges out of order or removed lines that no longer
/// match the base.
#[must_use]
pub fn compose(base: &str, hunks: &[&Hunk]) -> Option<String> {
    let lines = split_lines(base);
    let mut out = String::with_capacity(base.len());
    let mut cursor = 0usize;

    for hunk in hunks {
        if hunk.kind != HunkKind::Modify {
            return None;
        }
        let start = hunk.old_start as usize;
        let end = hunk.old_end() as usize;
        if start < cursor || end > lines.len() {
            return None;
        }
        if lines[start..end]
            .iter()
            .zip(&hunk.removed)
            .any(|(base_line, removed)| *base_line != removed.as_str())
            || hunk.removed.len() != end - start
        {
            return None;
        }

        lines[cursor..start].iter().for_each(|l| out.push_str(l));
        hunk.added.iter().for_each(|l| out.push_str(l));
        cursor = end;
    }

    lines[cursor..].iter().for_each(|l| out.push_str(l));
    Some(out)
}

/// Split a freshly diffed hunk back into known hunks that tile it exactly.
///
/// Zero-context diffs merge hunks that touch, so two claimed hunks applied
/// side by side come back as one. When the fresh hunk is exactly the
/// concatenation of known hunks, those hunks (with updated `new_start`) are
/// returned and their ids survive.
#[must_use]
pub fn split_by_known(fresh: &Hunk, known: &[&Hunk]) -> Option<Vec<Hunk>> {
    if fresh.kind != HunkKind::Modify {
        return None;
    }

    let candidates: Vec<&Hunk> = known
        .iter()
        .copied()
        .filter(|k| {
            k.kind == HunkKind::Modify
                && k.path == fresh.path
                && k.base_blob == fresh.base_blob
                && k.old_start >= fresh.old_start
                && k.old_end() <= fresh.old_end()
                && (k.old_lines > 0 || k.new_lines > 0)
        })
        .collect();
    if candidates.len() < 2 {
        return None;
    }

    let mut used = vec![false; candidates.len()];
    let mut pieces = Vec::new();
    let (mut old_cursor, mut r_off, mut a_off) = (fresh.old_start, 0usize, 0usize);

    while r_off < fresh.removed.len() || a_off < fresh.added.len() {
        let next = candidates.iter().enumerate().find(|(i, k)| {
            !used[*i]
                && k.old_start == old_cursor
                && fresh.removed[r_off..].starts_with(&k.removed)
                && fresh.added[a_off..].starts_with(&k.added)
        })?;

        let (i, k) = next;
        let mut piece = (*k).clone();
        piece.new_start = fresh.new_start + to_u32(a_off);
        pieces.push(piece);

        used[i] = true;
        old_cursor += k.old_lines;
        r_off += k.removed.len();
        a_off += k.added.len();
    }

    (old_cursor == fresh.old_end()).then_some(pieces)
}

fn text_lines(data: &[u8], probe_bytes: usize) -> Vec<String> {
    if is_binary(data, probe_bytes) {
        return Vec::new();
    }
    owned(&split_lines(utf8(data)))
}

fn utf8(data: &[u8]) -> &str {
    std::str::from_utf8(data).unwrap_or_default()
}

fn owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| (*l).to_string()).collect()
}

pub(crate) fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
