//! Single-writer guard for the data directory
//!
//! sled holds an exclusive file lock on its database; a second batch process
//! would fail part way through a pass. The pid file lets us refuse up front
//! with a readable message instead.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Pid lock file held for the lifetime of a batch process.
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    const LOCK_FILE_NAME: &'static str = ".trendwatch.lock";

    /// Take the lock in `data_dir`, creating the directory if needed.
    ///
    /// A lock left behind by a process that no longer exists is replaced.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::holder(&lock_path) {
                Some(pid) => bail!(
                    "another trendwatch process (pid {pid}) holds {}\n\
                     stop it, or remove the lock file if that process is gone",
                    lock_path.display()
                ),
                None => {
                    tracing::info!(path = %lock_path.display(), "replacing stale lock file");
                    fs::remove_file(&lock_path).context("failed to remove stale lock file")?;
                }
            }
        }

        let pid = std::process::id();
        let mut file = fs::File::create(&lock_path)
            .with_context(|| format!("failed to create lock file {}", lock_path.display()))?;
        writeln!(file, "{pid}").context("failed to write pid to lock file")?;

        tracing::debug!(pid, path = %lock_path.display(), "acquired process lock");
        Ok(Self { lock_path, owned: true })
    }

    /// Pid of a live trendwatch process holding the lock, if any.
    /// Unreadable or garbled lock files count as stale.
    fn holder(lock_path: &Path) -> Option<u32> {
        let contents = match fs::read_to_string(lock_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "could not read existing lock file");
                return None;
            }
        };
        let pid: u32 = contents.trim().parse().ok()?;
        Self::is_trendwatch_running(pid).then_some(pid)
    }

    #[cfg(unix)]
    #[allow(unsafe_code)]
    fn is_trendwatch_running(pid: u32) -> bool {
        let Ok(raw) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // SAFETY: signal 0 performs the existence check only, nothing is delivered.
        let alive = unsafe { libc::kill(raw, 0) } == 0
            || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
        if !alive {
            return false;
        }
        // A recycled pid belongs to some other program.
        match fs::read_to_string(format!("/proc/{pid}/cmdline")) {
            Ok(cmdline) => cmdline.contains("trendwatch"),
            Err(_) => true,
        }
    }

    #[cfg(not(unix))]
    fn is_trendwatch_running(_pid: u32) -> bool {
        true
    }

    /// Remove the lock file. Idempotent; also runs on drop.
    pub fn release(&mut self) {
        if !self.owned {
            return;
        }
        match fs::remove_file(&self.lock_path) {
            Ok(()) => tracing::debug!(path = %self.lock_path.display(), "released process lock"),
            Err(e) => tracing::warn!(error = %e, "failed to remove lock file"),
        }
        self.owned = false;
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}
