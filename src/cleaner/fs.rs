//! File-system access used by the cleaner.
//!
//! The cleaner only needs three things from the disk: the subdirectories of
//! a folder, the last-access time of one file, and a way to remove a
//! directory. Keeping them behind [`CacheFs`] lets tests script failures
//! and record which kind of removal was asked for.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::staging::StagingSession;

/// How a stale version directory is removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletionMode {
    /// Move to the staging area so it can be restored later
    Recoverable,
    /// Remove immediately, no undo
    #[default]
    Permanent,
}

impl std::fmt::Display for DeletionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeletionMode::Recoverable => write!(f, "recoverable"),
            DeletionMode::Permanent => write!(f, "permanent"),
        }
    }
}

/// A subdirectory returned by [`CacheFs::list_dirs`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: OsString,
    pub path: PathBuf,
}

impl DirEntryInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().map(OsString::from).unwrap_or_default();
        Self { name, path }
    }
}

pub trait CacheFs {
    /// Subdirectories of `dir`, in the order the listing returns them.
    /// Symlinks to directories are included.
    fn list_dirs(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>>;

    /// Last-access timestamp of a single file
    fn last_access(&self, file: &Path) -> io::Result<SystemTime>;

    /// Remove a directory and everything below it
    fn remove_dir(&self, dir: &Path, mode: DeletionMode) -> io::Result<()>;
}

/// [`CacheFs`] backed by the local disk
#[derive(Debug, Default)]
pub struct LocalFs {
    staging: Option<StagingSession>,
}

impl LocalFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recoverable removals are moved into `session`
    pub fn with_staging(session: StagingSession) -> Self {
        Self {
            staging: Some(session),
        }
    }

    pub fn staging(&self) -> Option<&StagingSession> {
        self.staging.as_ref()
    }
}

impl CacheFs for LocalFs {
    fn list_dirs(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            // Symlinked folders count when they point at a directory; dangling ones are skipped
            let is_dir = if file_type.is_symlink() {
                std::fs::metadata(entry.path()).is_ok_and(|m| m.is_dir())
            } else {
                file_type.is_dir()
            };
            if is_dir {
                dirs.push(DirEntryInfo {
                    name: entry.file_name(),
                    path: entry.path(),
                });
            }
        }
        Ok(dirs)
    }

    fn last_access(&self, file: &Path) -> io::Result<SystemTime> {
        let metadata = std::fs::metadata(file)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a file: {}", file.display()),
            ));
        }
        metadata.accessed()
    }

    fn remove_dir(&self, dir: &Path, mode: DeletionMode) -> io::Result<()> {
        match (mode, &self.staging) {
            (DeletionMode::Recoverable, Some(session)) => session.stage(dir),
            (DeletionMode::Recoverable, None) => {
                tracing::warn!(
                    path = %dir.display(),
                    "no staging area attached, removing permanently"
                );
                std::fs::remove_dir_all(dir)
            }
            (DeletionMode::Permanent, _) => std::fs::remove_dir_all(dir),
        }
    }
}
