//! SPI Bridge Core - Event translation, bundling, queuing and filtering.
//!
//! This crate turns the change notifications of a content store into SPI
//! event bundles and hands them to a polling consumer.
//!
//! # Modules
//!
//! - [`translator`] - Notification to event translation
//! - [`accumulator`] - Grouping of events into bundles
//! - [`queue`] - Pending-bundle queue with bounded-wait drain
//! - [`filter`] - Delivery-time event filters
//! - [`subscription`] - The subscription tying the pieces together
//! - [`memory`] - In-memory content store

pub mod accumulator;
pub mod config;
pub mod error;
pub mod filter;
pub mod memory;
pub mod queue;
pub mod session;
pub mod source;
pub mod subscription;
pub mod translator;

pub use accumulator::{new_bundle_id, BundleAccumulator};
pub use config::SubscriptionConfig;
pub use error::{Error, TranslationError};
pub use filter::{accepts, apply_filters, EventFilter, SharedFilter, StandardFilter};
pub use memory::{Batch, MemoryNode, MemorySession, MemoryStore};
pub use queue::BundleQueue;
pub use session::{ContentSession, StableReference};
pub use source::{ChangeNotification, EventListener, ListenerId, ListenerOptions, NotificationSource};
pub use subscription::{EventSubscription, LocalEventListener, SubscriptionStats};
pub use translator::{EventTranslator, ParentRef, TranslatedBatch};

/// Re-export protocol types.
pub use spibridge_proto as proto;
