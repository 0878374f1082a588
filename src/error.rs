use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapingError>;

/// Why a required article field could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionKind {
    Timeout,
    Missing,
    Unexpected,
}

impl fmt::Display for ExtractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExtractionKind::Timeout => "timed out waiting for",
            ExtractionKind::Missing => "missing",
            ExtractionKind::Unexpected => "unexpected failure reading",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum ScrapingError {
    #[error("Session init error: {0}")]
    SessionInit(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Extraction error: {kind} field '{field}' on {url}")]
    Extraction {
        kind: ExtractionKind,
        field: String,
        url: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    RestartSession,
    RetryWithBackoff,
    LogAndContinue,
    Abort,
}

impl ScrapingError {
    pub fn extraction(kind: ExtractionKind, field: impl Into<String>, url: impl Into<String>) -> Self {
        ScrapingError::Extraction {
            kind,
            field: field.into(),
            url: url.into(),
        }
    }

    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            ScrapingError::SessionInit(_) => RecoveryStrategy::Abort,
            ScrapingError::Driver(_) => RecoveryStrategy::RestartSession,
            ScrapingError::Navigation(_) => RecoveryStrategy::RetryWithBackoff,
            ScrapingError::Timeout(_) => RecoveryStrategy::RetryWithBackoff,
            ScrapingError::Extraction { kind: ExtractionKind::Timeout, .. } => {
                RecoveryStrategy::RetryWithBackoff
            }
            ScrapingError::Extraction { .. } => RecoveryStrategy::LogAndContinue,
            ScrapingError::Persistence(_) => RecoveryStrategy::LogAndContinue,
            ScrapingError::Config(_) => RecoveryStrategy::Abort,
            ScrapingError::Parse(_) => RecoveryStrategy::LogAndContinue,
        }
    }

    /// Errors that a retry loop should attempt again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.recovery_strategy(),
            RecoveryStrategy::RestartSession | RecoveryStrategy::RetryWithBackoff
        )
    }

    /// Driver-level failures invalidate the browser session.
    pub fn needs_restart(&self) -> bool {
        self.recovery_strategy() == RecoveryStrategy::RestartSession
    }

    pub fn is_fatal(&self) -> bool {
        self.recovery_strategy() == RecoveryStrategy::Abort
    }
}

// Conversion implementations for common error types
impl From<std::io::Error> for ScrapingError {
    fn from(err: std::io::Error) -> Self {
        ScrapingError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for ScrapingError {
    fn from(err: serde_json::Error) -> Self {
        ScrapingError::Persistence(err.to_string())
    }
}

impl From<toml::de::Error> for ScrapingError {
    fn from(err: toml::de::Error) -> Self {
        ScrapingError::Config(err.to_string())
    }
}

impl From<url::ParseError> for ScrapingError {
    fn from(err: url::ParseError) -> Self {
        ScrapingError::Parse(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for ScrapingError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScrapingError::Driver(err.to_string())
    }
}
