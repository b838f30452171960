//! Command execution error types.

use thiserror::Error;

/// Errors that can occur while executing or preparing a command.
#[derive(Debug, Error)]
pub enum Error {
    /// The command has been disposed and can no longer be used.
    #[error("command has been disposed")]
    Disposed,

    /// A precondition for execution was not met.
    ///
    /// Raised synchronously before any network activity: missing or closed
    /// connection, transaction mismatch, empty command text, or an attempt
    /// to mutate a command while it is executing.
    #[error("command is not executable: {0}")]
    State(String),

    /// The command timeout elapsed before the command completed.
    ///
    /// Delivered through the same interrupt mechanism as a user
    /// cancellation, but classified distinctly so callers can tell
    /// "the server was too slow" from "I cancelled it".
    #[error("command timed out")]
    CommandTimeout,

    /// The command was cancelled by the caller.
    #[error("command was cancelled")]
    Cancelled,

    /// Statement preparation failed.
    #[error("prepare failed: {0}")]
    Prepare(String),

    /// The server reported a failure during dispatch or result reading.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a state error from a precondition description.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// Check if this is a state (precondition) error.
    ///
    /// State errors are raised before any network interaction and are
    /// never retried.
    #[must_use]
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_) | Self::Disposed)
    }

    /// Check if this error was caused by the command timeout elapsing.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CommandTimeout)
    }

    /// Check if this error was caused by a caller-initiated cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// The core performs no retries itself; this classification is for the
    /// connection/pool layer above.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CommandTimeout | Self::ConnectionClosed | Self::Io(_)
        )
    }
}

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_constructor() {
        let err = Error::state("no bound connection");
        assert!(err.is_state());
        assert_eq!(err.to_string(), "command is not executable: no bound connection");
    }

    #[test]
    fn test_timeout_classification() {
        assert!(Error::CommandTimeout.is_timeout());
        assert!(!Error::CommandTimeout.is_cancelled());
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Cancelled.is_timeout());
    }

    #[test]
    fn test_disposed_is_state() {
        assert!(Error::Disposed.is_state());
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::CommandTimeout.is_transient());
        assert!(Error::ConnectionClosed.is_transient());
        assert!(!Error::Cancelled.is_transient());
        assert!(!Error::state("x").is_transient());
    }
}
