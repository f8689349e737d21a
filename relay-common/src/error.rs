//! Error types for the Relay bridge.

use thiserror::Error;

/// Result type alias using the Relay error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Relay services.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Chat driver error
    #[error("Driver error: {0}")]
    Driver(String),

    /// Conversational backend error
    #[error("Backend error: {0}")]
    Backend(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Channel receive error
    #[error("Channel receive error")]
    ChannelRecv,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error should be contained rather than escalated.
    ///
    /// Everything short of a configuration error can be logged and
    /// survived; a bad config means the process cannot do useful work.
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::WithContext { source, .. } => source.is_recoverable(),
            _ => true,
        }
    }
}
