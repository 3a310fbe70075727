//! # Error Definitions

/// Failures while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The body is not a valid message.
    Malformed(String),
    /// The message could not be serialized.
    Serialization(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "Malformed frame: {}", msg),
            Self::Serialization(msg) => write!(f, "Serialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
