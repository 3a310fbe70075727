//! # Error Definitions
//!
//! Local validation errors (`InvalidArguments`, `OperationNotFound`) are
//! raised before any request leaves the process. Everything sourced from the
//! backend arrives as `Remote` with the backend's own message.

use crate::args;
use crate::backend::Feature;
use crate::codec;
use crate::engine::EngineError;
use crate::peer;

#[derive(Debug, Clone)]
pub enum Error {
    InvalidArguments(args::Error),
    OperationNotFound(String),
    /// The backend reported an exception.
    Remote(String),
    /// The backend cannot accept this kind of value.
    Unsupported(Feature),
    /// The channel to the worker failed or the request expired.
    Peer(peer::Error),
    Codec(codec::Error),
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArguments(e) => write!(f, "Invalid arguments: {}", e),
            Self::OperationNotFound(name) => write!(f, "Operation '{}' not found", name),
            Self::Remote(msg) => f.write_str(msg),
            Self::Unsupported(feature) => write!(f, "Backend does not support {}", feature),
            Self::Peer(e) => write!(f, "{}", e),
            Self::Codec(e) => write!(f, "Codec error: {}", e),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidArguments(e) => Some(e),
            Self::Peer(e) => Some(e),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<args::Error> for Error {
    fn from(e: args::Error) -> Self {
        Self::InvalidArguments(e)
    }
}

impl From<peer::Error> for Error {
    fn from(e: peer::Error) -> Self {
        match e {
            peer::Error::Remote(msg) => Self::Remote(msg),
            other => Self::Peer(other),
        }
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Self::Remote(e.0)
    }
}

impl From<codec::Error> for Error {
    fn from(e: codec::Error) -> Self {
        Self::Codec(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
