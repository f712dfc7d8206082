//! SPI observation protocol types.
//!
//! This crate defines the types a change-event consumer sees: qualified names
//! and paths, item identifiers, events and event bundles, plus a compact wire
//! encoding for bundles.
//!
//! # Modules
//!
//! - [`name`] - Qualified names and namespace resolution
//! - [`path`] - Absolute, normalized paths
//! - [`id`] - Node and property identifiers and the identifier factory
//! - [`event`] - Events, event types and bundles
//! - [`codec`] - Length-prefixed rkyv framing for bundle batches
//! - [`error`] - Protocol error types

pub mod codec;
pub mod error;
pub mod event;
pub mod id;
pub mod name;
pub mod path;

pub use error::Error;

// Re-export commonly used types at crate root
pub use codec::{decode_bundles, encode_bundles, BundleBatch};
pub use event::{Event, EventBundle, EventType, ALL_EVENTS};
pub use id::{DefaultIdFactory, IdFactory, ItemId, NodeId, PropertyId};
pub use name::{Name, NamespaceRegistry, NamespaceResolver};
pub use path::{Path, PathElement};

/// Protocol version for wire compatibility.
///
/// Included in every encoded [`BundleBatch`]; bump it when the archived
/// layout changes.
pub const PROTOCOL_VERSION: u32 = 1;
