//! Error types for the vocabmatch pipeline
//!
//! This module provides structured error handling using thiserror. Errors are
//! split by how the pipeline reacts to them: input defects and transient
//! judge failures are recovered locally, configuration errors abort the run.

use thiserror::Error;

/// Main error type for vocabmatch operations
#[derive(Error, Debug)]
pub enum VocabError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Judge API request failed permanently
    #[error("Judge API error: {0}")]
    JudgeApi(String),

    /// Judge returned a reply that could not be parsed
    #[error("Malformed judgment: {0}")]
    MalformedJudgment(String),

    /// Judge rate limit hit
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// External call exceeded its timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Network failure talking to the judge
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid or unusable input record
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Dismissal reason outside the accepted set
    #[error("Invalid dismissal reason: {0} (expected 'addressed' or 'ai_error')")]
    InvalidDismissalReason(String),

    /// Vocabulary catalog missing or empty
    #[error("Vocabulary catalog unavailable: {0}")]
    MissingCatalog(String),

    /// Corpus missing or empty
    #[error("Corpus unavailable: {0}")]
    MissingCorpus(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl VocabError {
    /// Whether a retry with backoff may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VocabError::RateLimitExceeded(_) | VocabError::Timeout(_) | VocabError::NetworkError(_)
        )
    }

    /// Whether the run must abort before writing anything
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VocabError::MissingCatalog(_)
                | VocabError::MissingCorpus(_)
                | VocabError::Config(_)
                | VocabError::ConfigParse(_)
        )
    }
}

/// Result type alias for vocabmatch operations
pub type Result<T> = std::result::Result<T, VocabError>;

/// Convert anyhow::Error to VocabError
impl From<anyhow::Error> for VocabError {
    fn from(err: anyhow::Error) -> Self {
        VocabError::Other(err.to_string())
    }
}

impl From<rusqlite::Error> for VocabError {
    fn from(err: rusqlite::Error) -> Self {
        VocabError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VocabError::NotFound("student 7 / word 12".to_string());
        assert_eq!(err.to_string(), "Not found: student 7 / word 12");
    }

    #[test]
    fn test_transient_classification() {
        assert!(VocabError::RateLimitExceeded("429".into()).is_transient());
        assert!(VocabError::Timeout("30s".into()).is_transient());
        assert!(VocabError::NetworkError("reset".into()).is_transient());
        assert!(!VocabError::JudgeApi("400".into()).is_transient());
        assert!(!VocabError::MalformedJudgment("{".into()).is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(VocabError::MissingCatalog("empty".into()).is_fatal());
        assert!(VocabError::MissingCorpus("empty".into()).is_fatal());
        assert!(!VocabError::InvalidInput("bad essay".into()).is_fatal());
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ not json").unwrap_err();
        let err: VocabError = json_err.into();
        assert!(matches!(err, VocabError::Serialization(_)));
    }
}
