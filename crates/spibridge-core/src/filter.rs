//! Delivery-time event filtering.
//!
//! Filters run when bundles are drained, not when they are captured, so one
//! subscription can be polled with different filter sets over time. A set of
//! filters is OR-combined: an event is delivered when any filter accepts it.
//!
//! An empty filter set lets every event through. This is the long-standing
//! behavior consumers rely on, even though "no filters" could be read as
//! "nothing matches".

use std::collections::HashSet;
use std::sync::Arc;

use spibridge_proto::{Event, EventBundle, Name, Path, ALL_EVENTS};

/// Decides whether an event is delivered.
pub trait EventFilter: Send + Sync {
    /// `is_local` tells whether the event's bundle came from the consuming
    /// session itself.
    fn accept(&self, event: &Event, is_local: bool) -> bool;
}

impl<F> EventFilter for F
where
    F: Fn(&Event, bool) -> bool + Send + Sync,
{
    fn accept(&self, event: &Event, is_local: bool) -> bool {
        self(event, is_local)
    }
}

/// Shared filter handle.
pub type SharedFilter = Arc<dyn EventFilter>;

/// Whether `filters` let `event` through.
pub fn accepts(filters: &[SharedFilter], event: &Event, is_local: bool) -> bool {
    filters.is_empty() || filters.iter().any(|f| f.accept(event, is_local))
}

/// Filter every bundle, keeping bundle ids, locality and event order.
///
/// Bundles left without events are still returned.
pub fn apply_filters(bundles: Vec<EventBundle>, filters: &[SharedFilter]) -> Vec<EventBundle> {
    if filters.is_empty() {
        return bundles;
    }
    bundles
        .into_iter()
        .map(|bundle| {
            let is_local = bundle.is_local();
            bundle.into_filtered(|event| accepts(filters, event, is_local))
        })
        .collect()
}

/// The standard observation filter.
///
/// An event passes when all configured criteria hold:
///
/// - its type is in the event type mask;
/// - it is not local, or local events are wanted;
/// - its parent id is anchored at one of the given unique ids (if any given);
/// - its parent node's primary or mixin type is one of the given types (if any
///   given);
/// - its parent path equals the filter path, or lies below it for deep filters.
#[derive(Debug, Clone)]
pub struct StandardFilter {
    event_types: u32,
    path: Path,
    deep: bool,
    unique_ids: Option<HashSet<String>>,
    node_types: Option<HashSet<Name>>,
    no_local: bool,
}

impl StandardFilter {
    /// Match every event type at exactly `path`.
    pub fn new(path: Path) -> Self {
        Self {
            event_types: ALL_EVENTS,
            path,
            deep: false,
            unique_ids: None,
            node_types: None,
            no_local: false,
        }
    }

    /// Match the whole workspace.
    pub fn everything() -> Self {
        Self::new(Path::root()).deep(true)
    }

    /// Restrict to an event type mask.
    pub fn with_event_types(mut self, mask: u32) -> Self {
        self.event_types = mask;
        self
    }

    /// Also match below the filter path.
    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    /// Restrict to parents anchored at these unique ids.
    pub fn with_unique_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.unique_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to parents of these node types.
    pub fn with_node_types<I>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = Name>,
    {
        self.node_types = Some(types.into_iter().collect());
        self
    }

    /// Drop events from local bundles.
    pub fn no_local(mut self, no_local: bool) -> Self {
        self.no_local = no_local;
        self
    }

    /// Wrap into a shared handle.
    pub fn shared(self) -> SharedFilter {
        Arc::new(self)
    }

    fn matches_path(&self, event: &Event) -> bool {
        match event.path().parent() {
            Ok(parent) => parent == self.path || (self.deep && parent.is_descendant_of(&self.path)),
            Err(_) => false,
        }
    }
}

impl EventFilter for StandardFilter {
    fn accept(&self, event: &Event, is_local: bool) -> bool {
        if !event.event_type().matches(self.event_types) {
            return false;
        }
        if is_local && self.no_local {
            return false;
        }
        if let Some(ids) = &self.unique_ids {
            match event.parent_id().unique_id() {
                Some(id) if ids.contains(id) => {}
                _ => return false,
            }
        }
        if let Some(types) = &self.node_types {
            let mut parent_types = event.primary_type().into_iter().chain(event.mixin_types());
            if !parent_types.any(|t| types.contains(t)) {
                return false;
            }
        }
        self.matches_path(event)
    }
}
