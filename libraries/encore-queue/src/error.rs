//! Error types for queue management

use crate::events::QueueEventKind;
use thiserror::Error;

/// Queue errors
///
/// Queue mutators never fail. These errors come from loading configuration
/// and from subscribers that fail while a notification is dispatched.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A subscriber returned an error or panicked
    #[error("Subscriber for '{kind}' failed: {message}")]
    Handler {
        /// Kind of notification being dispatched
        kind: QueueEventKind,
        /// Error or panic message reported by the subscriber
        message: String,
    },
}

impl From<::config::ConfigError> for QueueError {
    fn from(err: ::config::ConfigError) -> Self {
        QueueError::Config(err.to_string())
    }
}

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;
