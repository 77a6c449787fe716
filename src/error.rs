use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FigtreeError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid key name '{0}' (only [A-Za-z0-9_] and '.' are allowed)")]
    InvalidKeyName(String),

    #[error("Cannot build a tree from this source: {0}")]
    InvalidSourceType(String),

    #[error("Write attempted on a stack with no layers")]
    EmptyStack,

    #[error("Backend is closed")]
    BackendClosed,

    #[error("Backend is busy: {0}")]
    BackendBusy(String),

    #[error("Backend failure: {0}")]
    Backend(String),

    #[error("Failed to parse document: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("Failed to render document: {0}")]
    Render(#[source] serde_yaml::Error),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FigtreeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FigtreeError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<sled::Error> for FigtreeError {
    fn from(e: sled::Error) -> Self {
        match e {
            sled::Error::Io(ref io) if io.kind() == std::io::ErrorKind::WouldBlock => {
                FigtreeError::BackendBusy(e.to_string())
            }
            other => FigtreeError::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_not_found_formats() {
        let err = FigtreeError::KeyNotFound("database.url".into());
        assert!(err.to_string().contains("database.url"));
    }

    #[test]
    fn invalid_key_name_formats() {
        let err = FigtreeError::InvalidKeyName("a#b".into());
        assert!(err.to_string().contains("a#b"));
    }

    #[test]
    fn empty_stack_formats() {
        let err = FigtreeError::EmptyStack;
        assert!(err.to_string().contains("no layers"));
    }

    #[test]
    fn io_carries_path() {
        let err = FigtreeError::io(
            "/etc/app/settings.yaml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("settings.yaml"));
    }
}
