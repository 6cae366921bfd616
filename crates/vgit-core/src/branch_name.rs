//! Virtual branch name validation and newtype.
//!
//! Virtual branch names become real `refs/heads/<name>` references on push,
//! so they follow git's ref naming rules from the start. Shell metacharacters
//! are rejected as well since names are echoed into `git push` refspecs.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// A validated virtual branch name.
///
/// # Examples
///
/// ```
/// use vgit_core::BranchName;
///
/// assert!(BranchName::new("feat-x").is_ok());
/// assert!(BranchName::new("team/feat-y").is_ok());
///
/// assert!(BranchName::new("../escape").is_err());
/// assert!(BranchName::new("a b").is_err());
/// assert!(BranchName::new("x.lock").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBranchName`] if the name is not a valid
    /// git branch name or contains shell metacharacters.
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        if let Some(reason) = first_violation(&name) {
            return Err(Error::InvalidBranchName { name, reason });
        }
        Ok(Self(name))
    }

    /// Get the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The full ref this branch is published under.
    #[must_use]
    pub fn ref_name(&self) -> String {
        format!("refs/heads/{}", self.0)
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for BranchName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for BranchName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for BranchName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Serialize for BranchName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BranchName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Characters git refuses in ref names.
const GIT_FORBIDDEN: &[char] = &[' ', '~', '^', ':', '?', '*', '['];

/// Characters that would be interpreted by a shell.
const SHELL_META: &[char] = &[
    '$', ';', '|', '&', '>', '<', '`', '\\', '"', '\'', '(', ')', '{', '}', '!',
];

/// Substrings git refuses anywhere in a ref name.
const FORBIDDEN_SEQUENCES: &[(&str, &str)] = &[
    ("..", "cannot contain '..'"),
    ("//", "cannot contain '//'"),
    ("@{", "cannot contain '@{'"),
    ("/.", "components cannot start with '.'"),
    (".lock/", "components cannot end with '.lock'"),
];

/// Return the first rule `name` breaks, if any.
fn first_violation(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("name cannot be empty".into());
    }
    if name == "@" {
        return Some("name cannot be '@'".into());
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Some("name cannot start or end with '.'".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Some("name cannot start or end with '/'".into());
    }
    #[allow(clippy::case_sensitive_file_extension_comparisons)]
    if name.ends_with(".lock") {
        return Some("name cannot end with '.lock'".into());
    }

    if let Some(c) = name.chars().find(char::is_ascii_control) {
        return Some(format!("name cannot contain control character {c:?}"));
    }
    if let Some(c) = name.chars().find(|c| GIT_FORBIDDEN.contains(c)) {
        return Some(format!("name cannot contain '{c}'"));
    }
    if let Some(c) = name.chars().find(|c| SHELL_META.contains(c)) {
        return Some(format!("name cannot contain shell metacharacter '{c}'"));
    }

    FORBIDDEN_SEQUENCES
        .iter()
        .find(|(seq, _)| name.contains(seq))
        .map(|(_, reason)| format!("name {reason}"))
}
