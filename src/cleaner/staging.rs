//! Staging area for recoverable deletion.
//!
//! Each clean that runs in recoverable mode gets a session directory:
//!
//! ```text
//! <staging>/<session-id>/session.json
//! <staging>/<session-id>/<package>/<version>/...
//! ```
//!
//! A session can be restored into the cache it came from or purged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

use super::engine::PACKAGES_DIR;
use crate::common::errors::CleanerError;

const SESSION_FILE: &str = "session.json";

/// Metadata written next to the staged versions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    /// Cache root the versions were taken from
    pub cache_root: PathBuf,
}

/// One recoverable clean's worth of staged versions
#[derive(Debug, Clone)]
pub struct StagingSession {
    info: SessionInfo,
    dir: PathBuf,
}

impl StagingSession {
    pub fn id(&self) -> &str {
        &self.info.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move a version directory into the session.
    ///
    /// The session directory and its `session.json` are created on first
    /// use so runs that remove nothing leave no trace.
    pub fn stage(&self, version_dir: &Path) -> io::Result<()> {
        let (package, version) = package_and_version(version_dir).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a version directory: {}", version_dir.display()),
            )
        })?;

        // Surface a vanished source as NotFound before touching the session
        std::fs::symlink_metadata(version_dir)?;

        self.ensure_created()?;
        let target = self.dir.join(package).join(version);
        if target.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("already staged: {}", target.display()),
            ));
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        move_dir(version_dir, &target)?;
        tracing::debug!(from = %version_dir.display(), to = %target.display(), "staged version");
        Ok(())
    }

    fn ensure_created(&self) -> io::Result<()> {
        let info_path = self.dir.join(SESSION_FILE);
        if info_path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(&self.info).map_err(io::Error::other)?;
        std::fs::write(info_path, json)
    }
}

/// Staged versions grouped by session
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a session for versions removed from `cache_root`
    pub fn begin_session(&self, cache_root: &Path) -> StagingSession {
        let now = Utc::now();
        let mut session_id = now.format("%Y-%m-%dT%H-%M-%S").to_string();
        let mut suffix = 1;
        while self.root.join(&session_id).exists() {
            suffix += 1;
            session_id = format!("{}-{}", now.format("%Y-%m-%dT%H-%M-%S"), suffix);
        }

        StagingSession {
            dir: self.root.join(&session_id),
            info: SessionInfo {
                session_id,
                created_at: now,
                cache_root: cache_root.to_path_buf(),
            },
        }
    }

    /// All sessions with a readable `session.json`, most recent first
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, CleanerError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CleanerError::io(&self.root, e)),
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CleanerError::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Ok(info) = read_info(&path) else {
                continue;
            };
            sessions.push(SessionSummary {
                versions: staged_versions(&path).len(),
                staged_size: dir_size(&path),
                info,
            });
        }

        sessions.sort_by(|a, b| b.info.created_at.cmp(&a.info.created_at));
        Ok(sessions)
    }

    pub fn most_recent_session(&self) -> Result<Option<String>, CleanerError> {
        Ok(self
            .list_sessions()?
            .into_iter()
            .next()
            .map(|s| s.info.session_id))
    }

    /// Move every staged version back into the cache it came from.
    ///
    /// Versions that already exist in the cache again are left staged and
    /// reported. The session is removed once nothing is left in it.
    pub fn restore(&self, session_id: &str) -> Result<RestoreReport, CleanerError> {
        if !is_session_id(session_id) {
            return Err(CleanerError::SessionNotFound {
                id: session_id.to_string(),
            });
        }
        let dir = self.root.join(session_id);
        let info = read_info(&dir).map_err(|_| CleanerError::SessionNotFound {
            id: session_id.to_string(),
        })?;
        let packages_root = info.cache_root.join(PACKAGES_DIR);

        let mut report = RestoreReport {
            session_id: session_id.to_string(),
            restored: Vec::new(),
            errors: Vec::new(),
        };

        for (package, version) in staged_versions(&dir) {
            let staged = dir.join(&package).join(&version);
            let original = packages_root.join(&package).join(&version);

            if original.exists() {
                report.errors.push(format!(
                    "'{}' exists in the cache again, left in staging",
                    original.display()
                ));
                continue;
            }

            let moved = original
                .parent()
                .map_or(Ok(()), std::fs::create_dir_all)
                .and_then(|()| move_dir(&staged, &original));
            match moved {
                Ok(()) => {
                    tracing::debug!(%package, %version, "restored version");
                    report.restored.push((package, version));
                }
                Err(e) => report
                    .errors
                    .push(format!("Failed to restore '{}': {}", original.display(), e)),
            }
        }

        if staged_versions(&dir).is_empty() {
            std::fs::remove_dir_all(&dir).map_err(|e| CleanerError::io(&dir, e))?;
        } else {
            remove_empty_package_dirs(&dir);
        }

        Ok(report)
    }

    /// Permanently delete every staged session
    pub fn purge_all(&self) -> Result<PurgeReport, CleanerError> {
        let mut report = PurgeReport {
            purged_sessions: Vec::new(),
            bytes_freed: 0,
            errors: Vec::new(),
        };

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(CleanerError::io(&self.root, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| CleanerError::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let session_id = entry.file_name().to_string_lossy().into_owned();
            let size = dir_size(&path);

            match std::fs::remove_dir_all(&path) {
                Ok(()) => {
                    report.bytes_freed += size;
                    report.purged_sessions.push(session_id);
                }
                Err(e) => report
                    .errors
                    .push(format!("Failed to purge '{}': {}", session_id, e)),
            }
        }

        Ok(report)
    }
}

/// Listing entry for one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub info: SessionInfo,
    pub versions: usize,
    pub staged_size: u64,
}

#[derive(Debug)]
pub struct RestoreReport {
    pub session_id: String,
    pub restored: Vec<(String, String)>,
    pub errors: Vec<String>,
}

#[derive(Debug)]
pub struct PurgeReport {
    pub purged_sessions: Vec<String>,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
}

/// A session id names exactly one directory directly under the staging root
fn is_session_id(id: &str) -> bool {
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(name)), None) if name == std::ffi::OsStr::new(id)
    )
}

fn read_info(session_dir: &Path) -> anyhow::Result<SessionInfo> {
    let contents = std::fs::read_to_string(session_dir.join(SESSION_FILE))?;
    Ok(serde_json::from_str(&contents)?)
}

/// `(package, version)` pairs staged in a session directory
fn staged_versions(session_dir: &Path) -> Vec<(String, String)> {
    let mut versions = Vec::new();
    let Ok(packages) = std::fs::read_dir(session_dir) else {
        return versions;
    };
    for package in packages.flatten() {
        if !package.path().is_dir() {
            continue;
        }
        let Ok(children) = std::fs::read_dir(package.path()) else {
            continue;
        };
        for version in children.flatten() {
            if version.path().is_dir() {
                versions.push((
                    package.file_name().to_string_lossy().into_owned(),
                    version.file_name().to_string_lossy().into_owned(),
                ));
            }
        }
    }
    versions
}

fn remove_empty_package_dirs(session_dir: &Path) {
    let Ok(packages) = std::fs::read_dir(session_dir) else {
        return;
    };
    for package in packages.flatten() {
        // remove_dir only succeeds on empty directories
        let _ = std::fs::remove_dir(package.path());
    }
}

fn package_and_version(version_dir: &Path) -> Option<(&std::ffi::OsStr, &std::ffi::OsStr)> {
    let version = version_dir.file_name()?;
    let package = version_dir.parent()?.file_name()?;
    Some((package, version))
}

/// Rename, or copy and delete when crossing filesystems.
///
/// Any other rename failure is returned as is and leaves `to` untouched.
fn move_dir(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(from = %from.display(), to = %to.display(), "rename crosses devices, copying");
        }
        Err(e) => return Err(e),
    }

    if let Err(e) = copy_dir_recursive(from, to) {
        let _ = std::fs::remove_dir_all(to);
        return Err(e);
    }
    std::fs::remove_dir_all(from)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }

    Ok(())
}

/// Total size of regular files below `path`
pub fn dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_version(cache: &Path, package: &str, version: &str) -> PathBuf {
        let dir = cache.join(PACKAGES_DIR).join(package).join(version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{}.{}.nupkg", package, version)),
            "package bytes",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_unused_session_leaves_no_directory() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::new(tmp.path().join("staging"));
        let session = area.begin_session(tmp.path());
        assert!(!session.dir().exists());
        assert!(area.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_stage_and_restore() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let version = make_version(&cache, "serilog", "2.10.0");
        let area = StagingArea::new(tmp.path().join("staging"));
        let session = area.begin_session(&cache);

        session.stage(&version).unwrap();
        assert!(!version.exists());
        assert!(session
            .dir()
            .join("serilog/2.10.0/serilog.2.10.0.nupkg")
            .exists());

        let sessions = area.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].versions, 1);
        // package bytes plus session.json
        assert!(sessions[0].staged_size > "package bytes".len() as u64);

        let report = area.restore(session.id()).unwrap();
        assert_eq!(
            report.restored,
            vec![("serilog".to_string(), "2.10.0".to_string())]
        );
        assert!(report.errors.is_empty());
        assert!(version.join("serilog.2.10.0.nupkg").exists());
        assert!(!session.dir().exists());
    }

    #[test]
    fn test_restore_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let version = make_version(&cache, "serilog", "2.10.0");
        let area = StagingArea::new(tmp.path().join("staging"));
        let session = area.begin_session(&cache);
        session.stage(&version).unwrap();

        // The package manager downloaded it again in the meantime
        make_version(&cache, "serilog", "2.10.0");

        let report = area.restore(session.id()).unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(session.dir().join("serilog/2.10.0").exists());
    }

    #[test]
    fn test_stage_missing_source_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::new(tmp.path().join("staging"));
        let session = area.begin_session(tmp.path());
        let err = session
            .stage(&tmp.path().join("packages/gone/1.0.0"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!session.dir().exists());
    }

    #[test]
    fn test_failed_move_leaves_no_staged_version() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let area = StagingArea::new(tmp.path().join("staging"));
        let session = area.begin_session(&cache);
        // Session exists because another version was staged first
        session.stage(&make_version(&cache, "a", "1.0.0")).unwrap();

        // Version vanished between the check in stage() and the move
        let missing = cache.join(PACKAGES_DIR).join("serilog").join("2.0.0");
        let target = session.dir().join("serilog").join("2.0.0");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();

        let err = move_dir(&missing, &target).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!target.exists());

        let sessions = area.list_sessions().unwrap();
        assert_eq!(sessions[0].versions, 1);

        let report = area.restore(session.id()).unwrap();
        assert_eq!(
            report.restored,
            vec![("a".to_string(), "1.0.0".to_string())]
        );
        assert!(!missing.exists());
    }

    #[test]
    fn test_move_into_missing_parent_fails_cleanly() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let version = make_version(&cache, "serilog", "2.0.0");
        let target = tmp.path().join("no-such-dir").join("2.0.0");

        assert!(move_dir(&version, &target).is_err());
        assert!(!target.exists());
        assert!(version.join("serilog.2.0.0.nupkg").exists());
    }

    #[test]
    fn test_restore_rejects_path_like_session_ids() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::new(tmp.path().join("staging"));
        std::fs::create_dir_all(area.root()).unwrap();

        for id in ["..", ".", "", "a/b", "../staging", "/tmp"] {
            assert!(
                matches!(area.restore(id), Err(CleanerError::SessionNotFound { .. })),
                "accepted {:?}",
                id
            );
        }
        assert!(tmp.path().exists());
        assert!(area.root().exists());
    }

    #[test]
    fn test_restore_unknown_session() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::new(tmp.path().join("staging"));
        assert!(matches!(
            area.restore("2020-01-01T00-00-00"),
            Err(CleanerError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_purge_all() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let area = StagingArea::new(tmp.path().join("staging"));
        let session = area.begin_session(&cache);
        session.stage(&make_version(&cache, "a", "1.0.0")).unwrap();
        session.stage(&make_version(&cache, "b", "1.0.0")).unwrap();

        let report = area.purge_all().unwrap();
        assert_eq!(report.purged_sessions, vec![session.id().to_string()]);
        assert!(report.bytes_freed > 2 * "package bytes".len() as u64);
        assert!(area.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_purge_without_staging_dir() {
        let tmp = TempDir::new().unwrap();
        let area = StagingArea::new(tmp.path().join("never-created"));
        let report = area.purge_all().unwrap();
        assert!(report.purged_sessions.is_empty());
        assert_eq!(report.bytes_freed, 0);
    }
}
