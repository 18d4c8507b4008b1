use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::fs::{CacheFs, DeletionMode, DirEntryInfo, LocalFs};
use crate::common::errors::CleanerError;

/// Name of the folder under the cache root that holds one folder per package
pub const PACKAGES_DIR: &str = "packages";

/// Default artifact extension for NuGet caches
pub const DEFAULT_ARTIFACT_EXTENSION: &str = "nupkg";

/// Something that happened to one package or version during a run
#[derive(Debug)]
pub enum CleanEvent {
    /// A stale version directory was removed
    PackageCleaned { package: String, version: String },
    /// Inspecting or removing `path` failed; the run went on without it
    Error { path: PathBuf, cause: io::Error },
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every package was visited
    Completed,
    /// The cache root has no `packages` folder
    NothingToClean,
    /// The `packages` folder could not be listed; an error event was emitted
    Aborted,
    /// The cancellation flag was raised before the walk finished
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::NothingToClean => write!(f, "nothing_to_clean"),
            RunStatus::Aborted => write!(f, "aborted"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Totals for one run. Per-item details go through the event sink.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub status: RunStatus,
    pub threshold: SystemTime,
    pub packages_total: usize,
    pub packages_processed: usize,
    pub versions_inspected: usize,
    pub cleaned: usize,
    pub errors: usize,
}

impl RunSummary {
    fn new(threshold: SystemTime) -> Self {
        Self {
            status: RunStatus::Completed,
            threshold,
            packages_total: 0,
            packages_processed: 0,
            versions_inspected: 0,
            cleaned: 0,
            errors: 0,
        }
    }
}

/// Result of looking at one version's artifact
#[derive(Debug)]
pub enum Inspection {
    Accessed(SystemTime),
    /// No artifact to judge: missing file or a name we cannot build a path from
    Absent,
    Failed(io::Error),
}

/// Removes package versions whose artifact has not been accessed within the
/// retention window.
///
/// Expects the NuGet layout
/// `<root>/packages/<package>/<version>/<package>.<version>.<ext>`. Packages
/// and versions are visited in whatever order the directory listing
/// returns; nothing is sorted.
///
/// A run never fails because of a single package or version. Those problems
/// are reported through the event sink and the walk moves on. The only hard
/// error is running without a root.
pub struct Cleaner<F: CacheFs = LocalFs> {
    fs: F,
    root: Option<PathBuf>,
    max_age: Duration,
    mode: DeletionMode,
    artifact_extension: String,
    cancel: Option<Arc<AtomicBool>>,
}

impl Cleaner<LocalFs> {
    /// Cleaner on the local disk that keeps versions accessed within `max_age`
    pub fn new(max_age: Duration) -> Self {
        Self::with_fs(LocalFs::new(), max_age)
    }
}

impl<F: CacheFs> Cleaner<F> {
    pub fn with_fs(fs: F, max_age: Duration) -> Self {
        Self {
            fs,
            root: None,
            max_age,
            mode: DeletionMode::default(),
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_string(),
            cancel: None,
        }
    }

    /// Set the cache root
    #[must_use]
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: DeletionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Extension of the per-version artifact, without the leading dot
    #[must_use]
    pub fn artifact_extension(mut self, ext: impl Into<String>) -> Self {
        self.artifact_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    /// Stop at the next package or version boundary once `flag` is set
    #[must_use]
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.root = Some(root.into());
    }

    pub fn set_max_age(&mut self, max_age: Duration) {
        self.max_age = max_age;
    }

    pub fn set_mode(&mut self, mode: DeletionMode) {
        self.mode = mode;
    }

    pub fn root_path(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn deletion_mode(&self) -> DeletionMode {
        self.mode
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Cutoff for a run starting at `now`. Clamped to the epoch for
    /// retention windows longer than the clock allows.
    pub fn threshold_at(&self, now: SystemTime) -> SystemTime {
        now.checked_sub(self.max_age).unwrap_or(UNIX_EPOCH)
    }

    /// Run one cleaning pass starting now.
    ///
    /// `progress` receives `processed / total` before each package is
    /// handled, so the final value is `(n - 1) / n` rather than `1.0`, and
    /// an empty `packages` folder produces no progress at all.
    ///
    /// # Errors
    ///
    /// Returns [`CleanerError::RootNotSet`] if no root was configured. No
    /// I/O is attempted in that case.
    pub fn run<P, E>(&self, progress: P, on_event: E) -> Result<RunSummary, CleanerError>
    where
        P: FnMut(f64),
        E: FnMut(CleanEvent),
    {
        self.run_at(SystemTime::now(), progress, on_event)
    }

    /// Same as [`Cleaner::run`] with an explicit clock reading.
    pub fn run_at<P, E>(
        &self,
        now: SystemTime,
        mut progress: P,
        mut on_event: E,
    ) -> Result<RunSummary, CleanerError>
    where
        P: FnMut(f64),
        E: FnMut(CleanEvent),
    {
        let root = self.root.as_deref().ok_or(CleanerError::RootNotSet)?;
        let threshold = self.threshold_at(now);
        let mut summary = RunSummary::new(threshold);

        tracing::info!(
            root = %root.display(),
            max_age_secs = self.max_age.as_secs(),
            mode = %self.mode,
            "starting clean"
        );

        let packages_root = root.join(PACKAGES_DIR);
        let packages = match self.fs.list_dirs(&packages_root) {
            Ok(packages) => packages,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %packages_root.display(), "no packages folder");
                summary.status = RunStatus::NothingToClean;
                return Ok(summary);
            }
            Err(e) => {
                tracing::warn!(path = %root.display(), error = %e, "cannot open packages folder");
                summary.errors += 1;
                summary.status = RunStatus::Aborted;
                on_event(CleanEvent::Error {
                    path: root.to_path_buf(),
                    cause: e,
                });
                return Ok(summary);
            }
        };

        summary.packages_total = packages.len();
        let total = packages.len() as f64;

        for (index, package) in packages.iter().enumerate() {
            if self.is_cancelled() {
                summary.status = RunStatus::Cancelled;
                break;
            }
            progress(index as f64 / total);
            summary.packages_processed += 1;

            if !self.clean_package(package, threshold, &mut summary, &mut on_event) {
                summary.status = RunStatus::Cancelled;
                break;
            }
        }

        tracing::info!(
            status = ?summary.status,
            cleaned = summary.cleaned,
            errors = summary.errors,
            "clean finished"
        );
        Ok(summary)
    }

    /// Returns false when cancelled partway through the package
    fn clean_package<E>(
        &self,
        package: &DirEntryInfo,
        threshold: SystemTime,
        summary: &mut RunSummary,
        on_event: &mut E,
    ) -> bool
    where
        E: FnMut(CleanEvent),
    {
        let versions = match self.fs.list_dirs(&package.path) {
            Ok(versions) => versions,
            Err(e) => {
                tracing::warn!(path = %package.path.display(), error = %e, "cannot list versions");
                summary.errors += 1;
                on_event(CleanEvent::Error {
                    path: package.path.clone(),
                    cause: e,
                });
                return true;
            }
        };

        for version in &versions {
            if self.is_cancelled() {
                return false;
            }
            summary.versions_inspected += 1;
            if let Err(cause) = self.clean_version(package, version, threshold, summary, on_event)
            {
                tracing::warn!(path = %version.path.display(), error = %cause, "cannot clean version");
                summary.errors += 1;
                on_event(CleanEvent::Error {
                    path: version.path.clone(),
                    cause,
                });
            }
        }
        true
    }

    fn clean_version<E>(
        &self,
        package: &DirEntryInfo,
        version: &DirEntryInfo,
        threshold: SystemTime,
        summary: &mut RunSummary,
        on_event: &mut E,
    ) -> io::Result<()>
    where
        E: FnMut(CleanEvent),
    {
        let accessed = match self.inspect(package, version) {
            Inspection::Accessed(time) => time,
            Inspection::Absent => {
                tracing::debug!(path = %version.path.display(), "no artifact, skipping");
                return Ok(());
            }
            Inspection::Failed(e) => return Err(e),
        };

        if accessed >= threshold {
            return Ok(());
        }

        match self.fs.remove_dir(&version.path, self.mode) {
            Ok(()) => {}
            Err(e) if is_benign(&e) => {
                tracing::debug!(path = %version.path.display(), "version vanished before removal");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let (package, version) = (lossy(package), lossy(version));
        tracing::debug!(%package, %version, "removed stale version");
        summary.cleaned += 1;
        on_event(CleanEvent::PackageCleaned { package, version });
        Ok(())
    }

    /// Read the last-access time of `<package>.<version>.<ext>` inside the
    /// version directory.
    pub fn inspect(&self, package: &DirEntryInfo, version: &DirEntryInfo) -> Inspection {
        let Some(name) = artifact_file_name(package, version, &self.artifact_extension) else {
            return Inspection::Absent;
        };
        match self.fs.last_access(&version.path.join(name)) {
            Ok(time) => Inspection::Accessed(time),
            Err(e) if is_benign(&e) => Inspection::Absent,
            // No access times on this platform: same as having no timestamp
            Err(e) if e.kind() == io::ErrorKind::Unsupported => Inspection::Absent,
            Err(e) => Inspection::Failed(e),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// `<package>.<version>.<ext>`, or `None` if either directory name is not
/// usable as part of a file name.
pub fn artifact_file_name(
    package: &DirEntryInfo,
    version: &DirEntryInfo,
    extension: &str,
) -> Option<String> {
    let package = package.name.to_str()?;
    let version = version.name.to_str()?;
    let usable = |s: &str| !s.is_empty() && !s.contains(['/', '\\', '\0']);
    if !usable(package) || !usable(version) {
        return None;
    }
    Some(format!("{}.{}.{}", package, version, extension))
}

/// Missing files and malformed names are races with the package manager,
/// not failures.
fn is_benign(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput
    )
}

fn lossy(entry: &DirEntryInfo) -> String {
    entry.name.to_string_lossy().into_owned()
}
