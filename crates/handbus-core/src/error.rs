use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Addressing errors
    #[error("Invalid finger index: {0} (expected 0-5)")]
    InvalidFinger(usize),

    #[error("Unknown finger name: {0}")]
    UnknownFingerName(String),

    #[error("Invalid register range: {0}")]
    InvalidRange(String),

    #[error("Register count mismatch: range covers {expected}, got {actual} values")]
    ValueCountMismatch { expected: usize, actual: usize },

    // Value errors
    #[error("Value {value} out of range {min}-{max}")]
    ValueOutOfRange { value: u16, min: u16, max: u16 },

    #[error("Invalid slave id: {0}")]
    InvalidSlaveId(u8),

    // Decoding errors
    #[error("Expected {expected} registers, got {actual}")]
    ShortRead { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
