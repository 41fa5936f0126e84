//! Error types for policygraph

use thiserror::Error;

/// Result type alias using policygraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Policygraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Graph errors (E001-E099)
    #[error("Node '{0}' not found. Run `policygraph stats` to check the graph is loaded.")]
    NodeNotFound(String),

    #[error("No graph snapshot has been saved yet. Run `policygraph ingest <file>` first.")]
    NoSnapshot,

    // Network errors (E100-E199)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check your API key with `policygraph config get llm.api_key`.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    // Extraction errors (E200-E299)
    #[error("Entity extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("No extraction result available for document '{0}'")]
    ExtractionMissing(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Stored graph snapshot is corrupted: {0}")]
    SnapshotCorrupted(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NodeNotFound(_) => "E001",
            Self::NoSnapshot => "E002",
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::RateLimited(_) => "E102",
            Self::ExtractionFailed(_) => "E200",
            Self::ExtractionMissing(_) => "E201",
            Self::DatabaseError(_) => "E400",
            Self::SnapshotCorrupted(_) => "E401",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Serialization(_) => "E801",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NodeNotFound(_) => Some("policygraph stats".to_string()),
            Self::NoSnapshot => Some("policygraph ingest <file>".to_string()),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("policygraph config get llm.api_key".to_string()),
            Self::SnapshotCorrupted(_) => Some(
                "policygraph clear && policygraph ingest <file> to rebuild the graph".to_string(),
            ),
            Self::ConfigError(_) => Some("policygraph config list".to_string()),
            _ => None,
        }
    }

    /// Whether the error originates in the persistence layer
    ///
    /// Persistence failures are never swallowed by the core; callers use this
    /// to distinguish them from collaborator failures that may be skipped.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::SnapshotCorrupted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NodeNotFound("x".into()).code(), "E001");
        assert_eq!(Error::NoSnapshot.code(), "E002");
        assert_eq!(Error::ExtractionFailed("bad".into()).code(), "E200");
        assert_eq!(Error::SnapshotCorrupted("bad".into()).code(), "E401");
        assert_eq!(Error::Other("x".into()).code(), "E9999");
    }

    #[test]
    fn test_error_suggestions() {
        assert_eq!(
            Error::NoSnapshot.suggestion(),
            Some("policygraph ingest <file>".to_string())
        );
        assert!(Error::InvalidInput("x".into()).suggestion().is_none());
    }

    #[test]
    fn test_persistence_classification() {
        assert!(Error::SnapshotCorrupted("truncated".into()).is_persistence());
        assert!(!Error::ExtractionFailed("timeout".into()).is_persistence());
    }

    #[test]
    fn test_error_display() {
        let err = Error::ExtractionMissing("doc-7".into());
        assert_eq!(
            err.to_string(),
            "No extraction result available for document 'doc-7'"
        );
    }

    #[test]
    fn test_from_serde_error() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse_err.into();
        assert_eq!(err.code(), "E801");
    }
}
