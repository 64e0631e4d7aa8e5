use thiserror::Error;

/// Unified error type for release-captain operations.
///
/// The first three variants carry the failure taxonomy the orchestrator
/// relies on: `Precondition` is an operator/programmer error that must never
/// be retried, `Transient` may resolve on its own (only the merge-request
/// poll tolerates these), and `Integration` is a configuration or
/// authentication problem with an external system.
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Integration error: {0}")]
    Integration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Version error: {0}")]
    Version(String),

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in release-captain
pub type Result<T> = std::result::Result<T, ReleaseError>;

impl ReleaseError {
    /// Create a precondition-violation error with context
    pub fn precondition(msg: impl Into<String>) -> Self {
        ReleaseError::Precondition(msg.into())
    }

    /// Create a transient-failure error with context
    pub fn transient(msg: impl Into<String>) -> Self {
        ReleaseError::Transient(msg.into())
    }

    /// Create an integration error with context
    pub fn integration(msg: impl Into<String>) -> Self {
        ReleaseError::Integration(msg.into())
    }

    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        ReleaseError::Config(msg.into())
    }

    /// Create a version error with context
    pub fn version(msg: impl Into<String>) -> Self {
        ReleaseError::Version(msg.into())
    }

    /// Whether waiting and trying again could possibly succeed.
    ///
    /// Only transient failures and network-level HTTP errors qualify;
    /// everything else needs an operator.
    pub fn retryable(&self) -> bool {
        match self {
            ReleaseError::Transient(_) => true,
            ReleaseError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReleaseError::precondition("version already exists");
        assert_eq!(
            err.to_string(),
            "Precondition violated: version already exists"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ReleaseError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_error_constructors() {
        assert!(ReleaseError::version("test").to_string().contains("Version"));
        assert!(ReleaseError::config("test")
            .to_string()
            .contains("Configuration"));
        assert!(ReleaseError::integration("test")
            .to_string()
            .contains("Integration"));
    }

    #[test]
    fn test_retryable_taxonomy() {
        assert!(ReleaseError::transient("merge not ready").retryable());
        assert!(!ReleaseError::precondition("bad version").retryable());
        assert!(!ReleaseError::integration("bad token").retryable());
        assert!(!ReleaseError::config("missing field").retryable());
    }

    #[test]
    fn test_error_messages_are_descriptive() {
        let error_pairs = vec![
            (ReleaseError::precondition("x"), "Precondition violated"),
            (ReleaseError::transient("x"), "Transient failure"),
            (ReleaseError::integration("x"), "Integration error"),
            (ReleaseError::config("x"), "Configuration error"),
            (ReleaseError::version("x"), "Version error"),
        ];

        for (err, expected_prefix) in error_pairs {
            let msg = err.to_string();
            assert!(
                msg.starts_with(expected_prefix),
                "Error message should start with '{}', but got '{}'",
                expected_prefix,
                msg
            );
        }
    }
}
