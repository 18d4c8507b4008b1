use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use tempfile::TempDir;

use nuget_sweep::cleaner::{
    CleanEvent, Cleaner, DeletionMode, LocalFs, RunStatus, StagingArea, PACKAGES_DIR,
};

const DAY: Duration = Duration::from_secs(86400);

/// Create `<root>/packages/<package>/<version>/<package>.<version>.nupkg`
/// last accessed `age` ago.
fn add_version(root: &Path, package: &str, version: &str, age: Duration) -> PathBuf {
    let dir = root.join(PACKAGES_DIR).join(package).join(version);
    std::fs::create_dir_all(&dir).unwrap();
    let artifact = dir.join(format!("{}.{}.nupkg", package, version));
    std::fs::write(&artifact, b"nupkg").unwrap();
    let accessed = FileTime::from_system_time(SystemTime::now() - age);
    filetime::set_file_atime(&artifact, accessed).unwrap();
    dir
}

fn run(cleaner: &Cleaner<LocalFs>) -> (RunStatus, Vec<f64>, Vec<CleanEvent>) {
    let mut progress = Vec::new();
    let mut events = Vec::new();
    let summary = cleaner
        .run(|p| progress.push(p), |e| events.push(e))
        .unwrap();
    (summary.status, progress, events)
}

fn cleaned(events: &[CleanEvent]) -> Vec<String> {
    let mut names: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            CleanEvent::PackageCleaned { package, version } => {
                Some(format!("{}/{}", package, version))
            }
            CleanEvent::Error { .. } => None,
        })
        .collect();
    // listing order is whatever the file system returns
    names.sort();
    names
}

#[test]
fn test_removes_only_stale_versions() {
    let tmp = TempDir::new().unwrap();
    let a1 = add_version(tmp.path(), "a", "1.0", DAY * 10);
    let a2 = add_version(tmp.path(), "a", "2.0", DAY);
    let b1 = add_version(tmp.path(), "b", "1.0", DAY * 30);

    let cleaner = Cleaner::new(DAY * 7).root(tmp.path());
    let (status, progress, events) = run(&cleaner);

    assert_eq!(status, RunStatus::Completed);
    assert_eq!(cleaned(&events), vec!["a/1.0", "b/1.0"]);
    assert!(events
        .iter()
        .all(|e| matches!(e, CleanEvent::PackageCleaned { .. })));
    assert!(!a1.exists());
    assert!(a2.exists());
    assert!(!b1.exists());
    // package folders themselves are never removed
    assert!(tmp.path().join("packages/a").exists());
    assert!(tmp.path().join("packages/b").exists());
    assert_eq!(progress, vec![0.0, 0.5]);
}

#[test]
fn test_missing_packages_folder_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let cleaner = Cleaner::new(DAY).root(tmp.path());
    let (status, progress, events) = run(&cleaner);

    assert_eq!(status, RunStatus::NothingToClean);
    assert!(progress.is_empty());
    assert!(events.is_empty());
}

#[test]
fn test_empty_packages_folder() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join(PACKAGES_DIR)).unwrap();

    let (status, progress, events) = run(&Cleaner::new(DAY).root(tmp.path()));
    assert_eq!(status, RunStatus::Completed);
    assert!(progress.is_empty());
    assert!(events.is_empty());
}

#[test]
fn test_packages_is_a_file_aborts_with_one_error() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join(PACKAGES_DIR), "not a folder").unwrap();

    let (status, progress, events) = run(&Cleaner::new(DAY).root(tmp.path()));
    assert_eq!(status, RunStatus::Aborted);
    assert!(progress.is_empty());
    assert!(matches!(
        &events[..],
        [CleanEvent::Error { path, .. }] if path == tmp.path()
    ));
}

#[test]
fn test_version_without_artifact_is_left_alone() {
    let tmp = TempDir::new().unwrap();
    let bare = tmp.path().join("packages/a/0.9");
    std::fs::create_dir_all(&bare).unwrap();
    std::fs::write(bare.join("something-else.nupkg"), b"x").unwrap();
    let stale = add_version(tmp.path(), "a", "1.0", DAY * 30);

    let (_, _, events) = run(&Cleaner::new(DAY * 7).root(tmp.path()));
    assert_eq!(cleaned(&events), vec!["a/1.0"]);
    assert_eq!(events.len(), 1);
    assert!(bare.exists());
    assert!(!stale.exists());
}

#[test]
fn test_loose_files_in_packages_are_ignored() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join(PACKAGES_DIR)).unwrap();
    std::fs::write(tmp.path().join("packages/.lock"), b"").unwrap();
    add_version(tmp.path(), "a", "1.0", DAY * 30);

    let (_, progress, events) = run(&Cleaner::new(DAY * 7).root(tmp.path()));
    assert_eq!(progress, vec![0.0]);
    assert_eq!(cleaned(&events), vec!["a/1.0"]);
}

#[test]
fn test_custom_extension() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("packages/tool/3.1.0");
    std::fs::create_dir_all(&dir).unwrap();
    let artifact = dir.join("tool.3.1.0.snupkg");
    std::fs::write(&artifact, b"x").unwrap();
    filetime::set_file_atime(
        &artifact,
        FileTime::from_system_time(SystemTime::now() - DAY * 60),
    )
    .unwrap();

    let cleaner = Cleaner::new(DAY * 7)
        .root(tmp.path())
        .artifact_extension("snupkg");
    let (_, _, events) = run(&cleaner);
    assert_eq!(cleaned(&events), vec!["tool/3.1.0"]);
    assert!(!dir.exists());
}

#[test]
fn test_recoverable_mode_moves_to_staging() {
    let tmp = TempDir::new().unwrap();
    let cache = tmp.path().join("cache");
    let stale = add_version(&cache, "serilog", "2.10.0", DAY * 30);
    let fresh = add_version(&cache, "serilog", "3.0.0", DAY);

    let area = StagingArea::new(tmp.path().join("staging"));
    let session = area.begin_session(&cache);
    let cleaner = Cleaner::with_fs(LocalFs::with_staging(session.clone()), DAY * 7)
        .root(&cache)
        .mode(DeletionMode::Recoverable);
    let (_, _, events) = run(&cleaner);

    assert_eq!(cleaned(&events), vec!["serilog/2.10.0"]);
    assert!(!stale.exists());
    assert!(fresh.exists());
    assert!(session
        .dir()
        .join("serilog/2.10.0/serilog.2.10.0.nupkg")
        .exists());

    let report = area.restore(session.id()).unwrap();
    assert_eq!(report.restored.len(), 1);
    assert!(stale.join("serilog.2.10.0.nupkg").exists());
}

#[test]
fn test_zero_retention_removes_everything_accessed_before_now() {
    let tmp = TempDir::new().unwrap();
    add_version(tmp.path(), "a", "1.0", DAY);
    add_version(tmp.path(), "b", "1.0", Duration::from_secs(60));

    let (_, _, events) = run(&Cleaner::new(Duration::ZERO).root(tmp.path()));
    assert_eq!(cleaned(&events), vec!["a/1.0", "b/1.0"]);
}

#[cfg(unix)]
#[test]
fn test_unreadable_package_is_reported_and_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    add_version(tmp.path(), "a", "1.0", DAY * 30);
    add_version(tmp.path(), "b", "1.0", DAY * 30);
    let locked = tmp.path().join("packages/a");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

    // root ignores permission bits; nothing to observe in that case
    if std::fs::read_dir(&locked).is_ok() {
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let (status, _, events) = run(&Cleaner::new(DAY * 7).root(tmp.path()));
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(status, RunStatus::Completed);
    assert_eq!(cleaned(&events), vec!["b/1.0"]);
    let errors: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            CleanEvent::Error { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![locked]);
}
