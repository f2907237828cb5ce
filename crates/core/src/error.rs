//! Error types for askdoc.
//!
//! One unified error enum covers configuration, indexing, tool, LLM, prompt
//! and session errors. Only `Config` and `Indexing` are meant to reach the
//! user as states requiring action; the rest are either transient or degrade
//! to the not-found answer before they get that far.

use thiserror::Error;

/// Unified error type for askdoc.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing credential, unknown provider, malformed config file.
    /// Raised at startup/construction, never per call.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The uploaded document could not be read or parsed.
    /// Recoverable by uploading a different document.
    #[error("Indexing error: {0}")]
    Indexing(String),

    /// A web search or scrape provider failed for one call.
    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    /// Input rejected before any work was attempted.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A query arrived while the session was still indexing a document.
    #[error("Still indexing '{0}', try again when indexing completes")]
    StillIndexing(String),

    /// Work was cancelled by a reset or a newer upload.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the user has to do something (fix credentials, re-upload)
    /// before the session can make progress.
    pub fn requires_user_action(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::Indexing(_))
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::StillIndexing(_) | AppError::ToolUnavailable(_) | AppError::Cancelled(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
