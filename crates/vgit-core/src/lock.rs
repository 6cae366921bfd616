//! Cross-process repository lock.
//!
//! Every mutating command holds an exclusive advisory lock on
//! `.git/vgit/lock` for its whole duration. The file itself is persistent and
//! never unlinked: only the advisory lock decides who holds it, and the OS
//! drops that lock when the holder exits or crashes. The holder's PID is
//! written into the file for diagnostics.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Seek, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const INITIAL_BACKOFF: Duration = Duration::from_millis(25);
const MAX_BACKOFF: Duration = Duration::from_millis(400);

/// RAII guard for the repository lock.
///
/// Dropping the guard clears the recorded PID and releases the advisory lock.
#[derive(Debug)]
pub struct RepoLock {
    file: Option<File>,
    path: PathBuf,
}

impl RepoLock {
    /// Acquire the lock at `path`, retrying with backoff for up to `timeout`.
    ///
    /// # Errors
    /// Returns [`Error::RepositoryBusy`] if another live process still holds
    /// the lock when the timeout expires.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let start = Instant::now();
        let mut delay = INITIAL_BACKOFF;

        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;

            match file.try_lock_exclusive() {
                Ok(()) => return Self::take(file, path),
                Err(e) if is_contended(&e) => {}
                Err(e) => return Err(e.into()),
            }
            drop(file);

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Error::RepositoryBusy {
                    holder: read_holder(path).unwrap_or_else(|| "unknown".into()),
                    path: path.to_path_buf(),
                });
            }
            debug!(?delay, "repository lock held, backing off");
            thread::sleep(delay.min(timeout - elapsed));
            delay = (delay * 2).min(MAX_BACKOFF);
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record our PID in a file we hold the advisory lock on.
    fn take(mut file: File, path: &Path) -> Result<Self> {
        if let Some(previous) = read_holder(path) {
            warn!(pid = %previous, path = %path.display(), "reclaiming stale repository lock");
        }
        file.set_len(0)?;
        file.rewind()?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        debug!(path = %path.display(), "acquired repository lock");
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.set_len(0);
            let _ = FileExt::unlock(&file);
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// PID recorded in the lock file, if any.
fn read_holder(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let pid = content.trim();
    (!pid.is_empty()).then(|| pid.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lock");

        let lock = RepoLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let recorded = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(recorded.trim(), std::process::id().to_string());

        drop(lock);
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        RepoLock::acquire(&path, Duration::from_millis(100)).unwrap();
    }

    #[test]
    fn test_second_holder_times_out_busy() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lock");

        let _held = RepoLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let started = Instant::now();
        let err = RepoLock::acquire(&path, Duration::from_millis(150)).unwrap_err();

        assert!(matches!(
            err,
            Error::RepositoryBusy { ref holder, .. } if *holder == std::process::id().to_string()
        ));
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_leftover_pid_without_lock_is_reclaimed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lock");
        fs::write(&path, "4194304999\n").unwrap();

        let lock = RepoLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let recorded = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(recorded.trim(), std::process::id().to_string());
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_pid_in_held_lock_does_not_admit_second_holder() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lock");

        let _held = RepoLock::acquire(&path, Duration::from_millis(100)).unwrap();
        // Looks stale by content, but the advisory lock is live.
        fs::write(&path, "4194304999\n").unwrap();

        let err = RepoLock::acquire(&path, Duration::from_millis(80)).unwrap_err();
        assert!(matches!(err, Error::RepositoryBusy { .. }));
        assert!(path.exists());
    }

    #[test]
    fn test_concurrent_holders_serialize() {
        let temp = TempDir::new().unwrap();
        let path = Arc::new(temp.path().join("lock"));
        let inside = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let (path, inside, done) = (path.clone(), inside.clone(), done.clone());
                thread::spawn(move || {
                    let _lock = RepoLock::acquire(&path, Duration::from_secs(10)).unwrap();
                    assert!(!inside.swap(true, Ordering::SeqCst), "two holders at once");
                    thread::sleep(Duration::from_millis(20));
                    inside.store(false, Ordering::SeqCst);
                    done.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }
}
