use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop an operation outright.
///
/// Problems with a single package or version during a clean are not
/// represented here; they are delivered as `CleanEvent::Error` values and
/// the walk continues. We use `anyhow` at the top level for CLI error
/// handling, but these typed errors let library callers match on failures.
#[derive(Debug, Error)]
pub enum CleanerError {
    /// The cleaner was asked to run without a cache root
    #[error("cache root is not set")]
    RootNotSet,

    /// No staging session with this id exists
    #[error("staging session '{id}' not found")]
    SessionNotFound { id: String },

    /// File system operation failed
    #[error("I/O error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CleanerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CleanerError::Io {
            path: path.into(),
            source,
        }
    }
}
