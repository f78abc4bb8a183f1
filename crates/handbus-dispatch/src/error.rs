//! Error types for command dispatch.

use handbus_hardware::TransportError;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors surfaced to producers of commands.
///
/// Only [`DispatchError::Transport`] describes the bus; everything else is a
/// property of the queue or of the request itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The queue has been shut down; the command was not and will not be run.
    #[error("Command queue is closed")]
    QueueClosed,

    /// The transaction for this command failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The worker went away without answering.
    #[error("Dispatch worker stopped before replying")]
    WorkerGone,

    /// The request was rejected before reaching the queue.
    #[error("Invalid command: {0}")]
    Invalid(#[from] handbus_core::Error),

    #[error("Unknown gesture: {0}")]
    UnknownGesture(String),

    #[error("Invalid gesture: {0}")]
    InvalidGesture(String),

    /// The worker answered with a different kind of output than requested.
    #[error("Unexpected reply: expected {expected}")]
    UnexpectedReply { expected: &'static str },
}

impl DispatchError {
    /// Create a new unknown gesture error.
    pub fn unknown_gesture(name: impl Into<String>) -> Self {
        Self::UnknownGesture(name.into())
    }

    /// Whether this error means no further command will ever run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::QueueClosed | Self::WorkerGone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_is_transparent() {
        let error: DispatchError = TransportError::timeout(2000).into();
        assert_eq!(error.to_string(), "Transaction timeout after 2000ms");
    }

    #[test]
    fn test_core_error_conversion() {
        let error: DispatchError = handbus_core::Error::InvalidFinger(9).into();
        assert!(matches!(error, DispatchError::Invalid(_)));
    }

    #[test]
    fn test_terminal_classification() {
        assert!(DispatchError::QueueClosed.is_terminal());
        assert!(DispatchError::WorkerGone.is_terminal());
        assert!(!DispatchError::unknown_gesture("wave").is_terminal());
        assert!(!DispatchError::from(TransportError::no_response(1, "")).is_terminal());
    }
}
