use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Lock file marking a running session.
///
/// A lock file left on disk at startup means the previous run did not shut
/// down cleanly. The file is removed on `release` or drop.
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
    previous_clean: bool,
    previous_pid: Option<u32>,
    released: bool,
}

impl SessionLock {
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let (previous_clean, previous_pid) = if path.exists() {
            let pid = fs::read_to_string(&path).ok().and_then(|s| s.trim().parse::<u32>().ok());
            match pid {
                Some(pid) => error!("Session: previous session (pid {}) ended abnormally", pid),
                None => error!("Session: previous session ended abnormally"),
            }
            (false, pid)
        } else {
            (true, None)
        };

        fs::write(&path, std::process::id().to_string())
            .map_err(|e| Error::SessionLock(format!("cannot write {}: {}", path.display(), e)))?;
        info!("Session: lock acquired at {}", path.display());

        Ok(Self {
            path,
            previous_clean,
            previous_pid,
            released: false,
        })
    }

    /// False when a stale lock from an earlier run was found.
    pub fn previous_session_clean(&self) -> bool {
        self.previous_clean
    }

    pub fn previous_pid(&self) -> Option<u32> {
        self.previous_pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Session: lock released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::SessionLock(format!("cannot remove {}: {}", self.path.display(), e))),
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Session: {}", e);
        }
    }
}
