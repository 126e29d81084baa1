// Error model for the deal lifecycle
//
// Every lifecycle operation fails with one of four caller-facing kinds; the
// HTTP layer maps them to status codes. Notification and email delivery
// failures are never surfaced here - they are logged and swallowed so they
// can never block a state transition.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Referenced listing/proposal/transaction/user is absent
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Caller is not the required owner/buyer/role
    #[error("{0}")]
    Forbidden(String),

    /// Current status does not permit the requested transition; the message
    /// names the expected prior state
    #[error("{0}")]
    PreconditionFailed(String),

    /// Malformed input (e.g. yield rate outside the allowed range)
    #[error("{0}")]
    ValidationFailed(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    /// Standard wording for an illegal transition: names the record, the
    /// expected prior state and the state it was actually found in
    pub fn wrong_status(record: &str, expected: &str, current: &str) -> Self {
        AppError::PreconditionFailed(format!(
            "{} must be {} (current status: {})",
            record, expected, current
        ))
    }
}
