use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeMarksError {
    /// The host (workspace, store, application) went away mid-operation.
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file pattern '{pattern}': {source}")]
    PatternCompile {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Marker store rejected the mutation: {0}")]
    MarkerStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl CodeMarksError {
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Only a vanished host short-circuits a whole scan; everything else is
    /// per-file or per-marker.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CollaboratorUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, CodeMarksError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CodeMarksError::file_read(
            "/tmp/missing.rs",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(error.to_string(), "Failed to read /tmp/missing.rs: gone");
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(CodeMarksError::CollaboratorUnavailable("closed".into()).is_fatal());
        assert!(!CodeMarksError::MarkerStore("rejected".into()).is_fatal());
    }
}
