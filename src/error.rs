//! Error types for execbox

use thiserror::Error;

use crate::sandbox::ProcessId;

/// Result type alias using execbox's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for execbox
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested language has no profile
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The isolation primitive could not be started
    #[error("Launch failed: {0}")]
    LaunchFailure(String),

    /// The process already reached a terminal state
    #[error("Process {0} has already terminated")]
    AlreadyTerminated(ProcessId),

    /// Docker/container error
    #[error("Container error: {0}")]
    Container(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (workspace writes, pipes)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedLanguage(_) | Error::InvalidInput(_) | Error::AlreadyTerminated(_)
        )
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::Container(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(Error::UnsupportedLanguage("cobol".into()).is_client_error());
        assert!(Error::AlreadyTerminated(ProcessId::new()).is_client_error());
        assert!(!Error::LaunchFailure("docker missing".into()).is_client_error());
        assert!(!Error::Io(std::io::Error::other("disk full")).is_client_error());
    }

    #[test]
    fn test_unsupported_language_message() {
        let err = Error::UnsupportedLanguage("cobol".into());
        assert_eq!(err.to_string(), "Unsupported language: cobol");
    }
}
