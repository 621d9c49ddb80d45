//! Scratch directory ownership for a reconstruction run.

use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Working directory of one reconstruction run.
///
/// A temporary directory is deleted when the value is dropped, whichever way the
/// run ends. A pinned directory belongs to the caller and is never deleted.
#[derive(Debug)]
pub enum WorkDir {
    Pinned(PathBuf),
    Temporary(TempDir),
}

impl WorkDir {
    /// Use `path` as the working directory, creating it if needed.
    pub fn pinned(path: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(path)?;
        Ok(WorkDir::Pinned(path.to_path_buf()))
    }

    /// Create a fresh temporary working directory.
    pub fn temporary() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("pmvs-").tempdir()?;
        debug!("Created temporary working directory {}", dir.path().display());
        Ok(WorkDir::Temporary(dir))
    }

    pub fn path(&self) -> &Path {
        match self {
            WorkDir::Pinned(path) => path,
            WorkDir::Temporary(dir) => dir.path(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, WorkDir::Temporary(_))
    }

    /// Releases the directory without deleting it and returns its path.
    pub fn persist(self) -> PathBuf {
        match self {
            WorkDir::Pinned(path) => path,
            WorkDir::Temporary(dir) => {
                let path = dir.keep();
                warn!("Keeping working directory {}", path.display());
                path
            }
        }
    }
}
