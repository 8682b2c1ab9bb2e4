use thiserror::Error;

/// Driver specific errors
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    /// The link could not be opened, or was lost while polling.
    #[error("Session error: {0}")]
    SessionError(String),
}

/// Errors returned by output sinks.
///
/// Drivers never retry a failed publication; the error is logged and the
/// value is dropped.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The sink has been closed by its consumer.
    #[error("Publisher is closed")]
    Closed,

    /// Serialization failed
    #[error("Serialization failed: {reason}")]
    SerializationError { reason: String },

    /// Writing to the underlying output failed
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PublishError {
    fn from(e: serde_json::Error) -> Self {
        PublishError::SerializationError {
            reason: e.to_string(),
        }
    }
}
