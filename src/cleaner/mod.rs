pub mod engine;
pub mod fs;
pub mod staging;

pub use engine::{
    CleanEvent, Cleaner, Inspection, RunStatus, RunSummary, DEFAULT_ARTIFACT_EXTENSION,
    PACKAGES_DIR,
};
pub use fs::{CacheFs, DeletionMode, DirEntryInfo, LocalFs};
pub use staging::{PurgeReport, RestoreReport, SessionSummary, StagingArea, StagingSession};
