//! Error types for Synheart Screen

use thiserror::Error;

/// Errors that can occur while running or replaying a screening session
#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid question bank: {0}")]
    InvalidBank(String),

    #[error("Cannot {action} during the {phase} phase")]
    InvalidPhase { phase: String, action: String },

    #[error("Answer for question {received} but {expected} is presented")]
    UnexpectedQuestion { expected: String, received: String },

    /// Internal consistency violation: a question id was scheduled twice.
    #[error("Question {0} was already delivered in this session")]
    DuplicateQuestion(String),

    #[error("Session was torn down before completion")]
    SessionCancelled,

    #[error("Report is not available until the session completes")]
    ReportUnavailable,

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
