//! Network push through the `git` binary.
//!
//! libgit2 credential handling differs from the user's git setup, so the
//! push itself is delegated to `git push`, which honours credential helpers,
//! ssh agents and `insteadOf` rewrites.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Push `local_ref` to `refs/heads/<remote_ref>` on `remote`.
///
/// With `force`, uses `--force-with-lease` so a remote that moved since the
/// last fetch is still protected.
pub(crate) fn push_ref(
    workdir: &Path,
    local_ref: &str,
    remote: &str,
    remote_ref: &str,
    force: bool,
) -> Result<()> {
    let refspec = format!("{local_ref}:refs/heads/{remote_ref}");
    let mut args = vec!["push".to_string(), "--porcelain".to_string()];
    if force {
        args.push(format!("--force-with-lease=refs/heads/{remote_ref}"));
    }
    args.push(remote.to_string());
    args.push(refspec);

    debug!(?args, "running git push");
    let output = Command::new("git")
        .args(&args)
        .current_dir(workdir)
        .output()
        .map_err(|e| Error::PushFailed(e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if output.status.success() {
        info!(local_ref, remote, remote_ref, "pushed");
        return Ok(());
    }

    if is_rejected(&stdout) || is_rejected(&stderr) {
        return Err(Error::NonFastForward(format!("{remote}/{remote_ref}")));
    }

    Err(Error::PushFailed(stderr.trim().to_string()))
}

/// Whether git reported the update as rejected for divergence.
fn is_rejected(output: &str) -> bool {
    output.lines().any(|line| {
        // Porcelain: "!\t<src>:<dst>\t[rejected] (non-fast-forward)"
        (line.starts_with('!') && line.contains("[rejected]"))
            || line.contains("non-fast-forward")
            || line.contains("(fetch first)")
            || line.contains("stale info")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_rejected_porcelain() {
        let out = "To ../remote.git\n!\trefs/heads/feat:refs/heads/feat\t[rejected] (non-fast-forward)\nDone\n";
        assert!(is_rejected(out));
    }

    #[test]
    fn test_is_rejected_fetch_first() {
        let out = "!\trefs/heads/feat:refs/heads/feat\t[rejected] (fetch first)\n";
        assert!(is_rejected(out));
    }

    #[test]
    fn test_lease_failure_counts_as_rejected() {
        let out = "!\trefs/heads/feat:refs/heads/feat\t[rejected] (stale info)\n";
        assert!(is_rejected(out));
    }

    #[test]
    fn test_success_output_is_not_rejected() {
        let out = "To ../remote.git\n*\trefs/heads/feat:refs/heads/feat\t[new branch]\nDone\n";
        assert!(!is_rejected(out));
    }
}
