//! Error handling for the billboard compliance workflow

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera permission denied or no capture device present
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// No frame could be captured from the live stream
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// Selected file is not an image
    #[error("Invalid file type: {0}")]
    InvalidFileType(String),

    /// Another analysis call is still pending
    #[error("Analysis already in progress")]
    AlreadyInProgress,

    /// Analysis endpoint returned a non-success status
    #[error("Analysis rejected ({status}): {message}")]
    AnalysisRejected { status: u16, message: String },

    /// Analysis response could not be interpreted
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// One or more feed endpoints failed during a refresh cycle
    #[error("Feed degraded: {0}")]
    FetchDegraded(String),

    /// Non-success status from a non-analysis endpoint
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where in the workflow an error belongs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Capture,
    Analysis,
    Feed,
    Transport,
    Config,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::DeviceUnavailable(_) | Error::CaptureFailed(_) | Error::InvalidFileType(_) => {
                ErrorCategory::Capture
            }
            Error::AlreadyInProgress
            | Error::AnalysisRejected { .. }
            | Error::MalformedResponse(_) => ErrorCategory::Analysis,
            Error::FetchDegraded(_) => ErrorCategory::Feed,
            Error::Config(_) | Error::Validation(_) => ErrorCategory::Config,
            Error::Api { .. }
            | Error::NotFound(_)
            | Error::Parse(_)
            | Error::Serialization(_)
            | Error::Http(_)
            | Error::Io(_) => ErrorCategory::Transport,
        }
    }

    /// Capture and analysis errors end the current attempt; the user starts a new one.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Capture | ErrorCategory::Analysis
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_follow_workflow_side() {
        assert_eq!(
            Error::DeviceUnavailable("denied".into()).category(),
            ErrorCategory::Capture
        );
        assert_eq!(Error::AlreadyInProgress.category(), ErrorCategory::Analysis);
        assert_eq!(
            Error::FetchDegraded("statistics".into()).category(),
            ErrorCategory::Feed
        );
        assert_eq!(
            Error::Api { status: 500, message: "boom".into() }.category(),
            ErrorCategory::Transport
        );
    }

    #[test]
    fn test_user_recoverable() {
        assert!(Error::InvalidFileType("text/plain".into()).is_user_recoverable());
        assert!(Error::MalformedResponse("missing".into()).is_user_recoverable());
        assert!(!Error::FetchDegraded("reports".into()).is_user_recoverable());
    }

    #[test]
    fn test_rejected_display() {
        let err = Error::AnalysisRejected {
            status: 400,
            message: "File must be an image".into(),
        };
        assert_eq!(
            err.to_string(),
            "Analysis rejected (400): File must be an image"
        );
    }
}
