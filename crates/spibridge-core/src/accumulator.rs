//! Grouping of translated events into bundles.

use spibridge_proto::{Event, EventBundle};
use uuid::Uuid;

/// Collects the events of one delivery callback into a single bundle.
///
/// Every callback yields exactly one bundle, even when no event survived
/// translation.
#[derive(Debug)]
pub struct BundleAccumulator {
    events: Vec<Event>,
    is_local: bool,
}

impl BundleAccumulator {
    /// Start a bundle with the given locality.
    pub fn new(is_local: bool) -> Self {
        Self {
            events: Vec::new(),
            is_local,
        }
    }

    /// Append one event.
    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Number of events collected so far.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no event has been collected.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Seal the bundle under a fresh id.
    pub fn finish(self) -> EventBundle {
        EventBundle::new(self.events, self.is_local, new_bundle_id())
    }
}

impl Extend<Event> for BundleAccumulator {
    fn extend<I: IntoIterator<Item = Event>>(&mut self, iter: I) {
        self.events.extend(iter);
    }
}

/// A random 128-bit bundle id in hyphenated form.
pub fn new_bundle_id() -> String {
    Uuid::new_v4().to_string()
}
