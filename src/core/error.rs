//! # Reminder Errors
//!
//! Error taxonomy shared by the reminder pipeline.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Added timeout helper mapping elapsed deadlines to ExternalService
//! - 1.0.0: Initial taxonomy

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the scheduler, stores and action handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReminderError {
    /// Malformed input, usually a time-of-day string
    #[error("Invalid value '{value}': {reason}")]
    Validation { value: String, reason: String },

    /// Unknown notification id, resolved reminder, or vanished medication
    #[error("{0} not found")]
    NotFound(String),

    /// Snooze budget exhausted
    #[error("Maximum snoozes reached. Please take your medication or mark it as missed.")]
    LimitExceeded,

    /// Medication API or notification surface failed or timed out
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Key-value store read/write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The reminder command loop has shut down
    #[error("Reminder service is not running")]
    ServiceStopped,
}

pub type Result<T> = std::result::Result<T, ReminderError>;

impl ReminderError {
    pub fn validation(value: impl Into<String>, reason: impl Into<String>) -> Self {
        ReminderError::Validation {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ReminderError {
    fn from(e: serde_json::Error) -> Self {
        ReminderError::Persistence(format!("serialization failed: {e}"))
    }
}

impl From<sqlite::Error> for ReminderError {
    fn from(e: sqlite::Error) -> Self {
        ReminderError::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for ReminderError {
    fn from(e: reqwest::Error) -> Self {
        ReminderError::ExternalService(e.to_string())
    }
}

/// Run an external call under a deadline; expiry maps to `ExternalService`
pub async fn with_timeout<T, F>(what: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ReminderError::ExternalService(format!(
            "{what} timed out after {}s",
            limit.as_secs_f32()
        ))),
    }
}
