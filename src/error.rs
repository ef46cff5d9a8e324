use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the library core
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem unreadable or missing (fatal when it hits a scan root)
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catalog persistence unavailable or corrupt
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A single entry could not be built; counted as skipped by scans
    #[error("cannot extract {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Metadata or poster provider failure. Always degraded to a fallback.
    #[error("external lookup failed: {0}")]
    ExternalLookup(String),

    #[error("a scan is already running")]
    ScanInProgress,

    #[error("no video with id {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Player invocation failures. None of these touch play statistics.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("player not found: {0}")]
    PlayerNotFound(String),

    #[error("video file is not accessible: {}", .0.display())]
    PathInaccessible(PathBuf),

    #[error("failed to start player {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_path() {
        let err = Error::io(
            "/media/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/media/missing"));
    }

    #[test]
    fn test_launch_error_is_transparent() {
        let err: Error = LaunchError::PlayerNotFound("mpv".into()).into();
        assert_eq!(err.to_string(), "player not found: mpv");
    }
}
