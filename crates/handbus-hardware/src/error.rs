//! Error types for bus transactions.
//!
//! A [`TransportError`] always belongs to exactly one transaction. The
//! dispatch layer reports it to the command that caused it and carries on
//! with the next command; it is never a process-level fault.

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur during a single Modbus transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The slave did not answer within the response timeout.
    #[error("Transaction timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The line stayed silent or the frame was lost.
    #[error("No response received from slave {slave}: {message}")]
    NoResponse { slave: u8, message: String },

    /// A response arrived but could not be used.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// The serial port could not be opened or has gone away.
    #[error("Port unavailable: {port}: {message}")]
    PortUnavailable { port: String, message: String },

    /// The slave answered with a Modbus exception.
    #[error("Modbus exception from slave {slave}: {code}")]
    Exception { slave: u8, code: String },

    /// Generic I/O error.
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl TransportError {
    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new no-response error.
    pub fn no_response(slave: u8, message: impl Into<String>) -> Self {
        Self::NoResponse {
            slave,
            message: message.into(),
        }
    }

    /// Create a new malformed response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a new port unavailable error.
    pub fn port_unavailable(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PortUnavailable {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create a new Modbus exception error.
    pub fn exception(slave: u8, code: impl Into<String>) -> Self {
        Self::Exception {
            slave,
            code: code.into(),
        }
    }

    /// Whether repeating the same transaction may succeed.
    ///
    /// Line noise and a slave that was momentarily busy are retryable; a
    /// missing port or a Modbus exception will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NoResponse { .. } | Self::MalformedResponse { .. }
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error() {
        let error = TransportError::timeout(500);
        assert!(matches!(error, TransportError::Timeout { .. }));
        assert_eq!(error.to_string(), "Transaction timeout after 500ms");
    }

    #[test]
    fn test_no_response_error() {
        let error = TransportError::no_response(1, "line silent");
        assert_eq!(
            error.to_string(),
            "No response received from slave 1: line silent"
        );
    }

    #[test]
    fn test_port_unavailable_error() {
        let error = TransportError::port_unavailable("/dev/ttyUSB0", "busy");
        assert_eq!(error.to_string(), "Port unavailable: /dev/ttyUSB0: busy");
    }

    #[test]
    fn test_exception_error() {
        let error = TransportError::exception(1, "IllegalDataAddress");
        assert_eq!(
            error.to_string(),
            "Modbus exception from slave 1: IllegalDataAddress"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::timeout(10).is_retryable());
        assert!(TransportError::no_response(1, "").is_retryable());
        assert!(TransportError::malformed("crc").is_retryable());
        assert!(!TransportError::port_unavailable("COM8", "gone").is_retryable());
        assert!(!TransportError::exception(1, "IllegalFunction").is_retryable());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let error: TransportError = io.into();
        assert!(matches!(error, TransportError::Io { .. }));
        assert_eq!(error.to_string(), "I/O error: pipe closed");
    }
}
