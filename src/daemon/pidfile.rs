//! PID file bookkeeping and the exclusive advisory lock that keeps two
//! daemons from running against the same cache directory at once.
//!
//! Grounded on `leta/daemon/pidfile.py`: same read/write/remove/
//! is-process-running shape, same "PID file present but owning process is
//! gone" self-healing, `flock(2)` in place of `fcntl.flock`.

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::Path;

#[must_use]
pub fn read_pid(pid_path: &Path) -> Option<i32> {
    std::fs::read_to_string(pid_path).ok()?.trim().parse().ok()
}

pub fn write_pid(pid_path: &Path, pid: i32) -> std::io::Result<()> {
    if let Some(parent) = pid_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(pid_path, pid.to_string())
}

pub fn remove_pid(pid_path: &Path) {
    if let Err(e) = std::fs::remove_file(pid_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("failed to remove pid file {}: {e}", pid_path.display());
        }
    }
}

#[must_use]
pub fn is_process_running(pid: i32) -> bool {
    // SAFETY: kill with signal 0 performs no action beyond checking that the
    // process exists and is signalable; this matches `os.kill(pid, 0)`.
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        return true;
    }
    let errno = std::io::Error::last_os_error().raw_os_error();
    errno == Some(libc::EPERM)
}

#[must_use]
pub fn is_daemon_running(pid_path: &Path) -> bool {
    read_pid(pid_path).is_some_and(is_process_running)
}

/// Send SIGTERM to a running daemon found via `pid_path`. Returns `true` if
/// a signal was actually sent; cleans up a stale PID file otherwise.
pub fn stop_daemon(pid_path: &Path) -> bool {
    let Some(pid) = read_pid(pid_path) else {
        return false;
    };
    if !is_process_running(pid) {
        remove_pid(pid_path);
        return false;
    }
    // SAFETY: pid came from our own PID file and was just confirmed alive.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        true
    } else {
        remove_pid(pid_path);
        false
    }
}

/// Holds the open file descriptor backing an acquired daemon lock; dropping
/// it releases the `flock` and removes the lock file.
pub struct DaemonLock {
    file: std::fs::File,
    lock_path: std::path::PathBuf,
}

impl DaemonLock {
    /// Try to acquire the exclusive, non-blocking lock at `lock_path`.
    ///
    /// Returns `Ok(None)` (not an error) if another daemon already holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or opened.
    pub fn try_acquire(lock_path: &Path) -> std::io::Result<Option<Self>> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().read(true).write(true).create(true).open(lock_path)?;

        // SAFETY: fd is owned by `file`, valid for the duration of this call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            Ok(Some(Self {
                file,
                lock_path: lock_path.to_path_buf(),
            }))
        } else {
            let err = std::io::Error::last_os_error();
            if matches!(err.raw_os_error(), Some(libc::EWOULDBLOCK)) {
                Ok(None)
            } else {
                Err(err)
            }
        }
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        // SAFETY: the fd is still valid; releasing an already-held lock on
        // close is a no-op if this somehow runs twice.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove lock file {}: {e}", self.lock_path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_pid_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_pid(&dir.path().join("daemon.pid")), None);
    }

    #[test]
    fn write_then_read_pid_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        write_pid(&path, 4242).unwrap();
        assert_eq!(read_pid(&path), Some(4242));
    }

    #[test]
    fn current_process_is_running() {
        assert!(is_process_running(std::process::id() as i32));
    }

    #[test]
    fn second_lock_attempt_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.lock");
        let first = DaemonLock::try_acquire(&path).unwrap();
        assert!(first.is_some());
        let second = DaemonLock::try_acquire(&path).unwrap();
        assert!(second.is_none());
        drop(first);
        let third = DaemonLock::try_acquire(&path).unwrap();
        assert!(third.is_some());
    }
}
