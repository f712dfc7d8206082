//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A name is syntactically invalid.
    #[error("illegal name '{name}': {reason}")]
    IllegalName { name: String, reason: String },

    /// A prefixed name uses a prefix the resolver does not know.
    #[error("unknown namespace prefix: {0}")]
    UnknownPrefix(String),

    /// A namespace URI has no registered prefix.
    #[error("unknown namespace uri: {0}")]
    UnknownNamespace(String),

    /// A path could not be parsed or navigated.
    #[error("malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    /// An identifier could not be built from the given parts.
    #[error("invalid item id: {0}")]
    InvalidId(String),

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Protocol version mismatch.
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// Invalid frame or message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl Error {
    pub(crate) fn illegal_name(name: &str, reason: impl Into<String>) -> Self {
        Error::IllegalName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_path(path: &str, reason: impl Into<String>) -> Self {
        Error::MalformedPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
