//! Error types for labnote.

use thiserror::Error;

/// Result type alias using labnote's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for labnote operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Required input missing (no document, no animal selected)
    #[error("Missing input: {0}")]
    InputAbsent(String),

    /// No exportable table found in the document
    #[error("No data: {0}")]
    NoData(String),

    /// Batch rejected before any write (aggregated, one violation per line)
    #[error("Validation failed:\n{0}")]
    Validation(String),

    /// A single site insert or experiment/stack upsert failed
    #[error("Write failed: {0}")]
    Write(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(e: crate::config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_input_absent() {
        let err = Error::InputAbsent("no animal selected".to_string());
        assert_eq!(err.to_string(), "Missing input: no animal selected");
    }

    #[test]
    fn test_error_display_validation_is_multiline() {
        let err = Error::Validation("row 2 is incomplete\nrow 3 is incomplete".to_string());
        let text = err.to_string();
        assert!(text.starts_with("Validation failed:\n"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_error_display_write() {
        let err = Error::Write("site 20: duplicate key".to_string());
        assert_eq!(err.to_string(), "Write failed: site 20: duplicate key");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "note.md");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("note.md"));
    }

    #[test]
    fn test_from_yaml_error() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Mapping>("key: [unclosed").unwrap_err();
        let err: Error = yaml_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
