//! Translation of raw change notifications into protocol events.
//!
//! For added and changed items the *parent* node is read from the live
//! session: consumers invalidate caches per container, so the container's
//! type and mixins are what an event carries. Removed items are gone by the
//! time the notification arrives, so removal events are built from the path
//! alone and carry no type information.

use spibridge_proto::{Event, EventType, IdFactory, ItemId, Name, NodeId, Path, PropertyId};

use crate::error::{Error, TranslationError};
use crate::session::{ContentSession, StableReference};
use crate::source::ChangeNotification;

/// Parent id of a translated event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// The parent node is referenceable; the id is anchored at its unique id.
    Referenced(NodeId),
    /// The id is built from the parent path.
    PathOnly(NodeId),
}

impl ParentRef {
    /// The node id regardless of how it was built.
    pub fn into_node_id(self) -> NodeId {
        match self {
            ParentRef::Referenced(id) | ParentRef::PathOnly(id) => id,
        }
    }

    /// Whether the id is reference-based.
    pub fn is_referenced(&self) -> bool {
        matches!(self, ParentRef::Referenced(_))
    }
}

/// Outcome of translating one delivered batch.
#[derive(Debug, Default)]
pub struct TranslatedBatch {
    /// Translated events in notification order.
    pub events: Vec<Event>,
    /// Notifications that could not be translated.
    pub failures: Vec<TranslationError>,
}

/// Translates notifications against a live session.
pub struct EventTranslator<'a, S: ContentSession> {
    id_factory: &'a dyn IdFactory,
    session: &'a S,
}

impl<'a, S: ContentSession> EventTranslator<'a, S> {
    /// Create a translator.
    pub fn new(id_factory: &'a dyn IdFactory, session: &'a S) -> Self {
        Self { id_factory, session }
    }

    /// Translate every notification of a batch.
    ///
    /// A failing notification is logged and skipped; it never stops the
    /// remaining ones.
    pub fn translate_batch<I>(&self, notifications: I) -> TranslatedBatch
    where
        I: IntoIterator<Item = ChangeNotification>,
    {
        let mut batch = TranslatedBatch::default();
        for notification in notifications {
            match self.translate(&notification) {
                Ok(event) => batch.events.push(event),
                Err(e) => {
                    tracing::warn!(
                        event_type = %e.event_type,
                        path = %e.path,
                        error = %e.source,
                        "unable to create SPI event"
                    );
                    batch.failures.push(e);
                }
            }
        }
        batch
    }

    /// Translate a single notification.
    pub fn translate(&self, notification: &ChangeNotification) -> Result<Event, TranslationError> {
        self.try_translate(notification)
            .map_err(|source| TranslationError {
                event_type: notification.event_type,
                path: notification.path.clone(),
                source,
            })
    }

    fn try_translate(&self, notification: &ChangeNotification) -> Result<Event, Error> {
        let resolver = self.session.namespace_resolver();
        let path = Path::parse(&notification.path, resolver)?;
        let parent_path = path.parent()?;
        let path_parent_id = self.id_factory.create_node_id(None, Some(&parent_path))?;

        let (item_id, live_parent) = match notification.event_type {
            EventType::NodeAdded => {
                let parent = self.session.parent_node(&notification.path)?;
                (self.node_id(&path)?, Some(parent))
            }
            EventType::NodeRemoved => (self.node_id(&path)?, None),
            EventType::PropertyAdded | EventType::PropertyChanged => {
                let parent = self.session.parent_node(&notification.path)?;
                (self.property_id(&path_parent_id, &path)?.into(), Some(parent))
            }
            EventType::PropertyRemoved => (self.property_id(&path_parent_id, &path)?.into(), None),
        };

        let mut parent_ref = ParentRef::PathOnly(path_parent_id);
        let mut primary_type = None;
        let mut mixin_types = Vec::new();
        if let Some(node) = live_parent {
            parent_ref = self.upgrade_parent(&node, parent_ref)?;
            primary_type = Some(Name::parse(&self.session.primary_type_name(&node)?, resolver)?);
            mixin_types = self
                .session
                .mixin_type_names(&node)?
                .iter()
                .map(|mixin| Name::parse(mixin, resolver))
                .collect::<Result<Vec<_>, _>>()?;
        }

        Ok(Event::new(
            notification.event_type,
            path,
            item_id,
            parent_ref.into_node_id(),
            primary_type,
            mixin_types,
            notification.user_id.clone(),
        ))
    }

    /// Swap the path-based parent id for a reference-based one when the live
    /// parent is referenceable.
    fn upgrade_parent(&self, node: &S::Node, fallback: ParentRef) -> Result<ParentRef, Error> {
        match self.session.stable_reference(node)? {
            StableReference::Referenced(unique_id) => Ok(ParentRef::Referenced(
                self.id_factory.create_node_id(Some(&unique_id), None)?,
            )),
            StableReference::Unsupported => Ok(fallback),
        }
    }

    fn node_id(&self, path: &Path) -> Result<ItemId, Error> {
        Ok(self.id_factory.create_node_id(None, Some(path))?.into())
    }

    fn property_id(&self, parent: &NodeId, path: &Path) -> Result<PropertyId, Error> {
        let name = path
            .name()
            .ok_or_else(|| Error::InvalidItemState("the root is not a property".to_string()))?;
        Ok(self.id_factory.create_property_id(parent, name)?)
    }
}
