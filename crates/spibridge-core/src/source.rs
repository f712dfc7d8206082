//! Raw change notifications and the listener contract of the store.

use std::sync::Arc;

use spibridge_proto::{EventType, ALL_EVENTS};

use crate::error::Error;

/// Id handed out for a listener registration.
pub type ListenerId = u64;

/// One mutation as reported by the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// Kind of change.
    pub event_type: EventType,
    /// Textual absolute path of the affected item.
    pub path: String,
    /// User that made the change.
    pub user_id: Option<String>,
}

impl ChangeNotification {
    /// Create a notification without a user.
    pub fn new(event_type: EventType, path: impl Into<String>) -> Self {
        Self {
            event_type,
            path: path.into(),
            user_id: None,
        }
    }

    /// Attach the originating user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Receives batches of notifications from a [`NotificationSource`].
///
/// One call carries every notification produced by one store operation
/// (typically one save), in the order the store produced them.
pub trait EventListener: Send + Sync {
    /// Handle a delivered batch.
    fn on_event(&self, notifications: Vec<ChangeNotification>);
}

/// How a listener wants to be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Mask of [`EventType`] bits to deliver.
    pub event_types: u32,
    /// Skip changes made through the registering session.
    pub no_local: bool,
}

impl ListenerOptions {
    /// Changes of other sessions only.
    pub fn remote(event_types: u32) -> Self {
        Self {
            event_types,
            no_local: true,
        }
    }

    /// Every change, including the registering session's own.
    pub fn all(event_types: u32) -> Self {
        Self {
            event_types,
            no_local: false,
        }
    }
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self::all(ALL_EVENTS)
    }
}

/// A store that delivers change notifications to registered listeners.
pub trait NotificationSource {
    /// Register a listener.
    fn add_listener(
        &self,
        listener: Arc<dyn EventListener>,
        options: ListenerOptions,
    ) -> Result<ListenerId, Error>;

    /// Remove a listener registration.
    fn remove_listener(&self, id: ListenerId) -> Result<(), Error>;
}
