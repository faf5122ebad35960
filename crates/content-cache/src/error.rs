//! Error types for the content cache

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CacheError {
    /// The backing file could not be opened or stat'd.
    Open { path: PathBuf, source: io::Error },
    /// The backing file could not be memory-mapped.
    Map { path: PathBuf, source: io::Error },
    /// Change notification could not be set up for the backing file.
    Watch { path: PathBuf, source: notify::Error },
    /// A resync could not complete; the previous content stays in place.
    Refresh { path: PathBuf, source: io::Error },
    /// The scheduler's background timer could not be started.
    Scheduler(io::Error),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Open { path, source } => {
                write!(f, "Failed to open {}: {}", path.display(), source)
            }
            CacheError::Map { path, source } => {
                write!(f, "Failed to map {}: {}", path.display(), source)
            }
            CacheError::Watch { path, source } => {
                write!(f, "Failed to watch {}: {}", path.display(), source)
            }
            CacheError::Refresh { path, source } => {
                write!(f, "Failed to refresh {}: {}", path.display(), source)
            }
            CacheError::Scheduler(err) => write!(f, "Scheduler error: {}", err),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Open { source, .. }
            | CacheError::Map { source, .. }
            | CacheError::Refresh { source, .. } => Some(source),
            CacheError::Watch { source, .. } => Some(source),
            CacheError::Scheduler(err) => Some(err),
        }
    }
}

impl CacheError {
    /// Re-label a creation-time failure as a refresh failure.
    pub(crate) fn into_refresh(self) -> Self {
        match self {
            CacheError::Open { path, source } | CacheError::Map { path, source } => {
                CacheError::Refresh { path, source }
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
