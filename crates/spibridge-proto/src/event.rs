//! Change events and event bundles.

use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::id::{ItemId, NodeId};
use crate::name::Name;
use crate::path::Path;

/// Mask matching every event type.
pub const ALL_EVENTS: u32 = EventType::NodeAdded.bits()
    | EventType::NodeRemoved.bits()
    | EventType::PropertyAdded.bits()
    | EventType::PropertyRemoved.bits()
    | EventType::PropertyChanged.bits();

/// Kind of change an event reports.
///
/// The bit values are the ones used by repository observation masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum EventType {
    /// A node was added.
    NodeAdded,
    /// A node was removed.
    NodeRemoved,
    /// A property was added.
    PropertyAdded,
    /// A property was removed.
    PropertyRemoved,
    /// A property value was changed.
    PropertyChanged,
}

impl EventType {
    /// All event types in bit order.
    pub const ALL: [EventType; 5] = [
        EventType::NodeAdded,
        EventType::NodeRemoved,
        EventType::PropertyAdded,
        EventType::PropertyRemoved,
        EventType::PropertyChanged,
    ];

    /// The mask bit of this type.
    pub const fn bits(self) -> u32 {
        match self {
            EventType::NodeAdded => 1,
            EventType::NodeRemoved => 2,
            EventType::PropertyAdded => 4,
            EventType::PropertyRemoved => 8,
            EventType::PropertyChanged => 16,
        }
    }

    /// Decode a single mask bit.
    pub fn from_bits(bits: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.bits() == bits)
    }

    /// Whether `mask` includes this type.
    pub fn matches(self, mask: u32) -> bool {
        mask & self.bits() != 0
    }

    /// Combine types into a mask.
    pub fn mask(types: &[EventType]) -> u32 {
        types.iter().fold(0, |mask, t| mask | t.bits())
    }

    /// Whether the affected item no longer exists once the event is observed.
    pub fn is_removal(self) -> bool {
        matches!(self, EventType::NodeRemoved | EventType::PropertyRemoved)
    }

    /// Kebab-case name, as used on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::NodeAdded => "node-added",
            EventType::NodeRemoved => "node-removed",
            EventType::PropertyAdded => "property-added",
            EventType::PropertyRemoved => "property-removed",
            EventType::PropertyChanged => "property-changed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type '{}'", s))
    }
}

/// A translated change event.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct Event {
    event_type: EventType,
    path: Path,
    item_id: ItemId,
    parent_id: NodeId,
    primary_type: Option<Name>,
    mixin_types: Vec<Name>,
    user_id: Option<String>,
}

impl Event {
    /// Create an event.
    ///
    /// `primary_type` and `mixin_types` describe the parent node of the
    /// affected item and are only known when that node could be read.
    pub fn new(
        event_type: EventType,
        path: Path,
        item_id: ItemId,
        parent_id: NodeId,
        primary_type: Option<Name>,
        mixin_types: Vec<Name>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            event_type,
            path,
            item_id,
            parent_id,
            primary_type,
            mixin_types,
            user_id,
        }
    }

    /// Kind of change.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Absolute path of the affected item.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id of the affected item.
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    /// Id of the parent node of the affected item.
    pub fn parent_id(&self) -> &NodeId {
        &self.parent_id
    }

    /// Primary type of the parent node.
    pub fn primary_type(&self) -> Option<&Name> {
        self.primary_type.as_ref()
    }

    /// Mixin types of the parent node.
    pub fn mixin_types(&self) -> &[Name] {
        &self.mixin_types
    }

    /// User that caused the change.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

/// An ordered group of events delivered together.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct EventBundle {
    events: Vec<Event>,
    is_local: bool,
    bundle_id: String,
}

impl EventBundle {
    /// Create a bundle.
    pub fn new(events: Vec<Event>, is_local: bool, bundle_id: impl Into<String>) -> Self {
        Self {
            events,
            is_local,
            bundle_id: bundle_id.into(),
        }
    }

    /// Events in delivery order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Whether the changes were made by the consuming session itself.
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// Opaque bundle id.
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the bundle has no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// A new bundle with the same id and locality holding only the events
    /// `keep` accepts.
    pub fn filtered<F>(&self, mut keep: F) -> EventBundle
    where
        F: FnMut(&Event) -> bool,
    {
        EventBundle {
            events: self.events.iter().filter(|e| keep(e)).cloned().collect(),
            is_local: self.is_local,
            bundle_id: self.bundle_id.clone(),
        }
    }

    /// Consuming variant of [`filtered`](Self::filtered).
    pub fn into_filtered<F>(self, mut keep: F) -> EventBundle
    where
        F: FnMut(&Event) -> bool,
    {
        EventBundle {
            events: self.events.into_iter().filter(|e| keep(e)).collect(),
            is_local: self.is_local,
            bundle_id: self.bundle_id,
        }
    }
}
