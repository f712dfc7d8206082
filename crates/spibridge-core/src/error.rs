//! Core error types.

use thiserror::Error;

use spibridge_proto::EventType;

/// Subscription errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Name, path or id error.
    #[error("protocol error: {0}")]
    Protocol(#[from] spibridge_proto::Error),

    /// The item is gone, or never existed.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// The item exists but the operation is not valid for it.
    #[error("invalid item state: {0}")]
    InvalidItemState(String),

    /// Unknown listener registration.
    #[error("listener {0} is not registered")]
    UnknownListener(u64),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A background task failed.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Failure to translate one change notification.
///
/// Never fatal: the notification is dropped and the rest of its batch is
/// translated as usual.
#[derive(Debug, Error)]
#[error("unable to create {event_type} event for {path}: {source}")]
pub struct TranslationError {
    /// Kind of the notification.
    pub event_type: EventType,
    /// Raw path carried by the notification.
    pub path: String,
    /// Underlying cause.
    #[source]
    pub source: Error,
}
