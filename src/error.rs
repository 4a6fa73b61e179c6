//! Error types for histfan.

use thiserror::Error;

/// Main error type for histfan.
#[derive(Error, Debug)]
pub enum HistfanError {
    /// Channel or process creation failed; fatal to the coordinator.
    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Invalid arguments: {0}")]
    Usage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A result channel was closed, short, or carried a malformed message.
    #[error("Channel error: {0}")]
    Channel(String),

    /// A termination notification named a worker that is not tracked.
    #[error("No tracked worker with pid {0}")]
    Resolution(i32),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("System call failed: {0}")]
    Sys(#[from] nix::errno::Errno),
}

/// Result type alias for histfan operations.
pub type Result<T> = std::result::Result<T, HistfanError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_setup_error_message() {
        let err = HistfanError::Setup("pipe2 failed".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Setup"));
        assert!(msg.contains("pipe2 failed"));
    }

    #[test]
    fn test_resolution_error_names_pid() {
        let err = HistfanError::Resolution(4242);
        assert!(err.to_string().contains("4242"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: HistfanError = io_err.into();
        assert!(matches!(err, HistfanError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_errno_conversion() {
        let err: HistfanError = nix::errno::Errno::ECHILD.into();
        assert!(matches!(err, HistfanError::Sys(_)));
        assert!(err.to_string().contains("System call"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err: HistfanError = json_err.into();
        assert!(err.to_string().contains("JSON"));
    }
}
