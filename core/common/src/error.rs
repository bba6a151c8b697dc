//! Common error types for docsync.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for docsync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Persisted registry is unreadable or fails validation.
    #[error("Corrupt registry: {0}")]
    CorruptRegistry(String),

    /// Registry was written by a newer schema than this build understands.
    #[error("Unsupported registry schema version {found} (supported up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    /// The external converter failed for a specific document.
    #[error("Conversion failed for {path}: {reason}")]
    Conversion { path: PathBuf, reason: String },

    /// A configured root directory does not exist or is not a directory.
    #[error("Root directory missing or inaccessible: {0}")]
    MissingRoot(PathBuf),

    /// Two tracked pairs would share a local or remote path.
    #[error("Path collision: {0}")]
    PathCollision(String),

    /// No registry found where one was required.
    #[error("Not initialized: no registry at {0}")]
    NotInitialized(PathBuf),

    /// A registry already exists and overwriting was not requested.
    #[error("Already initialized: registry exists at {0}")]
    AlreadyInitialized(PathBuf),

    /// Another process holds the registry lock.
    #[error("Registry is locked: {0} exists; remove it if no other docsync is running")]
    Locked(PathBuf),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether this error aborts a whole pass rather than a single pair.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::CorruptRegistry(_)
                | Error::UnsupportedSchema { .. }
                | Error::MissingRoot(_)
                | Error::NotInitialized(_)
                | Error::Locked(_)
        )
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_errors() {
        assert!(Error::CorruptRegistry("bad".into()).is_structural());
        assert!(Error::MissingRoot(PathBuf::from("/nope")).is_structural());
        assert!(Error::UnsupportedSchema { found: 9, supported: 1 }.is_structural());
    }

    #[test]
    fn test_per_pair_errors() {
        let err = Error::Conversion {
            path: PathBuf::from("notes.md"),
            reason: "pandoc exited with 1".into(),
        };
        assert!(!err.is_structural());
        assert!(err.to_string().contains("notes.md"));
        assert!(!Error::PathCollision("a.md".into()).is_structural());
    }
}
