//! In-memory content store.
//!
//! A small hierarchical store implementing both [`ContentSession`] and
//! [`NotificationSource`]. It backs the test suite and the replay tool.
//!
//! Nodes are keyed by their textual absolute path. Every mutation made
//! through a [`Batch`] is reported to listeners as one notification batch
//! once the batch closure returns, outside the store lock, so listeners may
//! read the store while handling it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use spibridge_proto::{EventType, Name, NamespaceRegistry, NamespaceResolver, Path};
use uuid::Uuid;

use crate::error::Error;
use crate::session::{ContentSession, StableReference};
use crate::source::{ChangeNotification, EventListener, ListenerId, ListenerOptions, NotificationSource};

/// Primary type of the root node.
pub const ROOT_NODE_TYPE: &str = "nt:unstructured";

/// Mixin that makes a node referenceable.
pub const MIX_REFERENCEABLE: &str = "mix:referenceable";

/// Property listing a node's mixins.
pub const JCR_MIXIN_TYPES: &str = "jcr:mixinTypes";

/// Property holding a referenceable node's unique id.
pub const JCR_UUID: &str = "jcr:uuid";

#[derive(Debug, Clone)]
struct NodeRecord {
    primary_type: String,
    mixins: Vec<String>,
    uuid: Option<String>,
    properties: BTreeMap<String, String>,
}

impl NodeRecord {
    fn new(primary_type: impl Into<String>) -> Self {
        Self {
            primary_type: primary_type.into(),
            mixins: Vec::new(),
            uuid: None,
            properties: BTreeMap::new(),
        }
    }
}

struct Registration {
    id: ListenerId,
    session_id: u64,
    options: ListenerOptions,
    listener: Arc<dyn EventListener>,
}

struct Shared {
    nodes: RwLock<BTreeMap<String, NodeRecord>>,
    listeners: RwLock<Vec<Registration>>,
    namespaces: NamespaceRegistry,
    next_listener_id: AtomicU64,
    next_session_id: AtomicU64,
}

impl Shared {
    fn deliver(&self, origin: u64, notifications: Vec<ChangeNotification>) {
        if notifications.is_empty() {
            return;
        }

        let targets: Vec<(ListenerId, Arc<dyn EventListener>, ListenerOptions)> = self
            .listeners
            .read()
            .iter()
            .filter(|r| !(r.options.no_local && r.session_id == origin))
            .map(|r| (r.id, Arc::clone(&r.listener), r.options))
            .collect();

        for (id, listener, options) in targets {
            let selected: Vec<ChangeNotification> = notifications
                .iter()
                .filter(|n| n.event_type.matches(options.event_types))
                .cloned()
                .collect();
            if selected.is_empty() {
                continue;
            }
            tracing::trace!(listener_id = id, notifications = selected.len(), "delivering batch");
            listener.on_event(selected);
        }
    }
}

/// Shared in-memory repository.
///
/// Cloning yields another handle to the same content.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create a store holding only the root node.
    pub fn new() -> Self {
        Self::with_namespaces(NamespaceRegistry::new())
    }

    /// Create a store resolving prefixes with `namespaces`.
    pub fn with_namespaces(namespaces: NamespaceRegistry) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), NodeRecord::new(ROOT_NODE_TYPE));
        Self {
            shared: Arc::new(Shared {
                nodes: RwLock::new(nodes),
                listeners: RwLock::new(Vec::new()),
                namespaces,
                next_listener_id: AtomicU64::new(1),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open a session for `user_id`.
    pub fn login(&self, user_id: impl Into<String>) -> MemorySession {
        let session_id = self.shared.next_session_id.fetch_add(1, Ordering::Relaxed);
        let user_id = user_id.into();
        tracing::debug!(session_id, user = %user_id, "session opened");
        MemorySession {
            shared: Arc::clone(&self.shared),
            session_id,
            user_id,
        }
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.shared.nodes.read().len()
    }

    /// Number of listener registrations.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.read().len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of a node taken when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryNode {
    /// Absolute path.
    pub path: String,
    /// Prefixed primary type name.
    pub primary_type: String,
    /// Prefixed mixin names in assignment order.
    pub mixins: Vec<String>,
    /// Unique id, for referenceable nodes.
    pub uuid: Option<String>,
}

/// A user's view of a [`MemoryStore`].
///
/// Clones share the session identity, so changes made through any clone
/// count as local for listeners registered through another.
#[derive(Clone)]
pub struct MemorySession {
    shared: Arc<Shared>,
    session_id: u64,
    user_id: String,
}

impl MemorySession {
    /// The session's user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Run `operation` and report all changes it made as one batch.
    ///
    /// Changes applied before an error are kept and reported.
    pub fn batch<T, F>(&self, operation: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Batch<'_>) -> Result<T, Error>,
    {
        let mut batch = Batch {
            session: self,
            notifications: Vec::new(),
        };
        let result = operation(&mut batch);
        let notifications = std::mem::take(&mut batch.notifications);
        self.shared.deliver(self.session_id, notifications);
        result
    }

    /// Add a node in its own batch.
    pub fn add_node(&self, path: &str, primary_type: &str) -> Result<(), Error> {
        self.batch(|b| b.add_node(path, primary_type))
    }

    /// Assign a mixin in its own batch.
    pub fn add_mixin(&self, path: &str, mixin: &str) -> Result<(), Error> {
        self.batch(|b| b.add_mixin(path, mixin))
    }

    /// Set a property in its own batch.
    pub fn set_property(&self, node_path: &str, name: &str, value: &str) -> Result<(), Error> {
        self.batch(|b| b.set_property(node_path, name, value))
    }

    /// Remove a property in its own batch.
    pub fn remove_property(&self, node_path: &str, name: &str) -> Result<(), Error> {
        self.batch(|b| b.remove_property(node_path, name))
    }

    /// Remove a node and its subtree in its own batch.
    pub fn remove_node(&self, path: &str) -> Result<(), Error> {
        self.batch(|b| b.remove_node(path))
    }

    /// Whether a node exists at `path`.
    pub fn node_exists(&self, path: &str) -> bool {
        self.shared.nodes.read().contains_key(path)
    }

    /// Value of a property.
    pub fn property(&self, node_path: &str, name: &str) -> Option<String> {
        self.shared
            .nodes
            .read()
            .get(node_path)
            .and_then(|n| n.properties.get(name).cloned())
    }

    /// Unique id of a referenceable node.
    pub fn node_uuid(&self, path: &str) -> Option<String> {
        self.shared.nodes.read().get(path).and_then(|n| n.uuid.clone())
    }

    fn notification(&self, event_type: EventType, path: String) -> ChangeNotification {
        ChangeNotification::new(event_type, path).with_user(self.user_id.clone())
    }

    fn canonical_path(&self, path: &str) -> Result<String, Error> {
        let parsed = Path::parse(path, &self.shared.namespaces)?;
        let canonical = parsed.format(&self.shared.namespaces)?;
        Ok(canonical)
    }

    fn check_name(&self, name: &str) -> Result<(), Error> {
        Name::parse(name, &self.shared.namespaces)?;
        Ok(())
    }
}

impl ContentSession for MemorySession {
    type Node = MemoryNode;

    fn namespace_resolver(&self) -> &dyn NamespaceResolver {
        &self.shared.namespaces
    }

    fn parent_node(&self, path: &str) -> Result<MemoryNode, Error> {
        let (parent, name) =
            split_parent(path).ok_or_else(|| Error::ItemNotFound(format!("{} has no parent", path)))?;

        let nodes = self.shared.nodes.read();
        let record = nodes
            .get(parent)
            .ok_or_else(|| Error::ItemNotFound(path.to_string()))?;
        if !nodes.contains_key(path) && !record.properties.contains_key(name) {
            return Err(Error::ItemNotFound(path.to_string()));
        }

        Ok(MemoryNode {
            path: parent.to_string(),
            primary_type: record.primary_type.clone(),
            mixins: record.mixins.clone(),
            uuid: record.uuid.clone(),
        })
    }

    fn primary_type_name(&self, node: &MemoryNode) -> Result<String, Error> {
        Ok(node.primary_type.clone())
    }

    fn mixin_type_names(&self, node: &MemoryNode) -> Result<Vec<String>, Error> {
        Ok(node.mixins.clone())
    }

    fn stable_reference(&self, node: &MemoryNode) -> Result<StableReference, Error> {
        Ok(match &node.uuid {
            Some(uuid) if node.mixins.iter().any(|m| m == MIX_REFERENCEABLE) => {
                StableReference::Referenced(uuid.clone())
            }
            _ => StableReference::Unsupported,
        })
    }
}

impl NotificationSource for MemorySession {
    fn add_listener(
        &self,
        listener: Arc<dyn EventListener>,
        options: ListenerOptions,
    ) -> Result<ListenerId, Error> {
        let id = self.shared.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.shared.listeners.write().push(Registration {
            id,
            session_id: self.session_id,
            options,
            listener,
        });
        tracing::debug!(
            listener_id = id,
            session_id = self.session_id,
            event_types = options.event_types,
            no_local = options.no_local,
            "listener added"
        );
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) -> Result<(), Error> {
        let mut listeners = self.shared.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        if listeners.len() == before {
            return Err(Error::UnknownListener(id));
        }
        tracing::debug!(listener_id = id, "listener removed");
        Ok(())
    }
}

/// Mutations grouped into one notification batch.
pub struct Batch<'s> {
    session: &'s MemorySession,
    notifications: Vec<ChangeNotification>,
}

impl Batch<'_> {
    /// Add a node below an existing parent.
    pub fn add_node(&mut self, path: &str, primary_type: &str) -> Result<(), Error> {
        let path = self.session.canonical_path(path)?;
        self.session.check_name(primary_type)?;
        let (parent, name) = split_parent(&path)
            .ok_or_else(|| Error::InvalidItemState("root node already exists".to_string()))?;

        {
            let mut nodes = self.session.shared.nodes.write();
            let parent_record = nodes
                .get(parent)
                .ok_or_else(|| Error::ItemNotFound(parent.to_string()))?;
            if nodes.contains_key(&path) || parent_record.properties.contains_key(name) {
                return Err(Error::InvalidItemState(format!("item exists: {}", path)));
            }
            nodes.insert(path.clone(), NodeRecord::new(primary_type));
        }

        self.push(EventType::NodeAdded, path);
        Ok(())
    }

    /// Assign a mixin. Assigning `mix:referenceable` gives the node a
    /// unique id.
    pub fn add_mixin(&mut self, path: &str, mixin: &str) -> Result<(), Error> {
        let path = self.session.canonical_path(path)?;
        self.session.check_name(mixin)?;

        let (mixins_existed, assigned_uuid) = {
            let mut nodes = self.session.shared.nodes.write();
            let record = nodes
                .get_mut(&path)
                .ok_or_else(|| Error::ItemNotFound(path.clone()))?;
            if record.mixins.iter().any(|m| m == mixin) {
                return Ok(());
            }

            let existed = !record.mixins.is_empty();
            record.mixins.push(mixin.to_string());
            record
                .properties
                .insert(JCR_MIXIN_TYPES.to_string(), record.mixins.join(" "));

            let mut assigned = false;
            if mixin == MIX_REFERENCEABLE && record.uuid.is_none() {
                let uuid = Uuid::new_v4().to_string();
                record.properties.insert(JCR_UUID.to_string(), uuid.clone());
                record.uuid = Some(uuid);
                assigned = true;
            }
            (existed, assigned)
        };

        let mixin_event = if mixins_existed {
            EventType::PropertyChanged
        } else {
            EventType::PropertyAdded
        };
        self.push(mixin_event, child_path(&path, JCR_MIXIN_TYPES));
        if assigned_uuid {
            self.push(EventType::PropertyAdded, child_path(&path, JCR_UUID));
        }
        Ok(())
    }

    /// Set a property, reporting it as added or changed.
    pub fn set_property(&mut self, node_path: &str, name: &str, value: &str) -> Result<(), Error> {
        let node_path = self.session.canonical_path(node_path)?;
        self.session.check_name(name)?;
        let property_path = child_path(&node_path, name);

        let existed = {
            let mut nodes = self.session.shared.nodes.write();
            if nodes.contains_key(&property_path) {
                return Err(Error::InvalidItemState(format!(
                    "a node exists at {}",
                    property_path
                )));
            }
            let record = nodes
                .get_mut(&node_path)
                .ok_or_else(|| Error::ItemNotFound(node_path.clone()))?;
            record
                .properties
                .insert(name.to_string(), value.to_string())
                .is_some()
        };

        let event_type = if existed {
            EventType::PropertyChanged
        } else {
            EventType::PropertyAdded
        };
        self.push(event_type, property_path);
        Ok(())
    }

    /// Remove a property.
    pub fn remove_property(&mut self, node_path: &str, name: &str) -> Result<(), Error> {
        let node_path = self.session.canonical_path(node_path)?;
        let property_path = child_path(&node_path, name);

        {
            let mut nodes = self.session.shared.nodes.write();
            let record = nodes
                .get_mut(&node_path)
                .ok_or_else(|| Error::ItemNotFound(node_path.clone()))?;
            if record.properties.remove(name).is_none() {
                return Err(Error::ItemNotFound(property_path));
            }
        }

        self.push(EventType::PropertyRemoved, property_path);
        Ok(())
    }

    /// Remove a node with its whole subtree.
    ///
    /// Only the removal of `path` itself is reported.
    pub fn remove_node(&mut self, path: &str) -> Result<(), Error> {
        let path = self.session.canonical_path(path)?;
        if split_parent(&path).is_none() {
            return Err(Error::InvalidItemState("cannot remove the root node".to_string()));
        }

        {
            let mut nodes = self.session.shared.nodes.write();
            if nodes.remove(&path).is_none() {
                return Err(Error::ItemNotFound(path));
            }
            let prefix = format!("{}/", path);
            nodes.retain(|key, _| !key.starts_with(&prefix));
        }

        self.push(EventType::NodeRemoved, path);
        Ok(())
    }

    /// Notifications collected so far.
    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    /// Whether nothing has changed yet.
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    fn push(&mut self, event_type: EventType, path: String) {
        let notification = self.session.notification(event_type, path);
        self.notifications.push(notification);
    }
}

fn split_parent(path: &str) -> Option<(&str, &str)> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { "/" } else { &path[..idx] };
    Some((parent, &path[idx + 1..]))
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<Vec<ChangeNotification>>>,
    }

    impl EventListener for Recorder {
        fn on_event(&self, notifications: Vec<ChangeNotification>) {
            self.batches.lock().push(notifications);
        }
    }

    fn kinds(batch: &[ChangeNotification]) -> Vec<(EventType, &str)> {
        batch.iter().map(|n| (n.event_type, n.path.as_str())).collect()
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("/"), None);
        assert_eq!(split_parent("/a"), Some(("/", "a")));
        assert_eq!(split_parent("/a/b"), Some(("/a", "b")));
        assert_eq!(child_path("/", "a"), "/a");
        assert_eq!(child_path("/a", "b"), "/a/b");
    }

    #[test]
    fn test_batch_is_delivered_once() {
        let store = MemoryStore::new();
        let session = store.login("alice");
        let recorder = Arc::new(Recorder::default());
        session
            .add_listener(recorder.clone(), ListenerOptions::default())
            .unwrap();

        session
            .batch(|b| {
                b.add_node("/a", "nt:folder")?;
                b.set_property("/a", "title", "one")?;
                b.set_property("/a", "title", "two")?;
                b.remove_property("/a", "title")
            })
            .unwrap();

        let batches = recorder.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            kinds(&batches[0]),
            vec![
                (EventType::NodeAdded, "/a"),
                (EventType::PropertyAdded, "/a/title"),
                (EventType::PropertyChanged, "/a/title"),
                (EventType::PropertyRemoved, "/a/title"),
            ]
        );
        assert!(batches[0].iter().all(|n| n.user_id.as_deref() == Some("alice")));
    }

    #[test]
    fn test_no_local_and_event_mask() {
        let store = MemoryStore::new();
        let alice = store.login("alice");
        let bob = store.login("bob");

        let remote = Arc::new(Recorder::default());
        let nodes_only = Arc::new(Recorder::default());
        alice
            .add_listener(remote.clone(), ListenerOptions::remote(spibridge_proto::ALL_EVENTS))
            .unwrap();
        alice
            .add_listener(
                nodes_only.clone(),
                ListenerOptions::all(EventType::mask(&[EventType::NodeAdded])),
            )
            .unwrap();

        alice.add_node("/mine", "nt:unstructured").unwrap();
        bob.add_node("/theirs", "nt:unstructured").unwrap();
        bob.set_property("/theirs", "p", "v").unwrap();

        let remote = remote.batches.lock();
        assert_eq!(remote.len(), 2);
        assert_eq!(remote[0][0].path, "/theirs");

        let nodes_only = nodes_only.batches.lock();
        assert_eq!(nodes_only.len(), 2);
        assert!(nodes_only
            .iter()
            .flatten()
            .all(|n| n.event_type == EventType::NodeAdded));
    }

    #[test]
    fn test_remove_listener() {
        let store = MemoryStore::new();
        let session = store.login("alice");
        let recorder = Arc::new(Recorder::default());
        let id = session
            .add_listener(recorder.clone(), ListenerOptions::default())
            .unwrap();
        assert_eq!(store.listener_count(), 1);

        session.remove_listener(id).unwrap();
        assert!(matches!(session.remove_listener(id), Err(Error::UnknownListener(_))));

        session.add_node("/a", "nt:unstructured").unwrap();
        assert!(recorder.batches.lock().is_empty());
    }

    #[test]
    fn test_referenceable_mixin_assigns_uuid() {
        let store = MemoryStore::new();
        let session = store.login("alice");
        let recorder = Arc::new(Recorder::default());
        session
            .add_listener(recorder.clone(), ListenerOptions::default())
            .unwrap();

        session.add_node("/doc", "nt:unstructured").unwrap();
        session.add_mixin("/doc", MIX_REFERENCEABLE).unwrap();
        session.add_mixin("/doc", "mix:versionable").unwrap();

        let uuid = session.node_uuid("/doc").unwrap();
        assert_eq!(session.property("/doc", JCR_UUID), Some(uuid.clone()));
        assert_eq!(
            session.property("/doc", JCR_MIXIN_TYPES).as_deref(),
            Some("mix:referenceable mix:versionable")
        );

        let batches = recorder.batches.lock();
        assert_eq!(
            kinds(&batches[1]),
            vec![
                (EventType::PropertyAdded, "/doc/jcr:mixinTypes"),
                (EventType::PropertyAdded, "/doc/jcr:uuid"),
            ]
        );
        assert_eq!(
            kinds(&batches[2]),
            vec![(EventType::PropertyChanged, "/doc/jcr:mixinTypes")]
        );

        let parent = session.parent_node("/doc/jcr:uuid").unwrap();
        assert_eq!(
            session.stable_reference(&parent).unwrap(),
            StableReference::Referenced(uuid)
        );
    }

    #[test]
    fn test_parent_node_of_missing_item() {
        let store = MemoryStore::new();
        let session = store.login("alice");
        session.add_node("/a", "nt:unstructured").unwrap();

        let parent = session.parent_node("/a").unwrap();
        assert_eq!(parent.path, "/");
        assert_eq!(parent.primary_type, ROOT_NODE_TYPE);
        assert_eq!(session.stable_reference(&parent).unwrap(), StableReference::Unsupported);

        assert!(matches!(session.parent_node("/a/nope"), Err(Error::ItemNotFound(_))));
        assert!(matches!(session.parent_node("/gone/p"), Err(Error::ItemNotFound(_))));
        assert!(matches!(session.parent_node("/"), Err(Error::ItemNotFound(_))));
    }

    #[test]
    fn test_remove_node_drops_subtree() {
        let store = MemoryStore::new();
        let session = store.login("alice");
        session
            .batch(|b| {
                b.add_node("/a", "nt:unstructured")?;
                b.add_node("/a/b", "nt:unstructured")?;
                b.add_node("/a/b/c", "nt:unstructured")?;
                b.add_node("/ab", "nt:unstructured")
            })
            .unwrap();
        assert_eq!(store.node_count(), 5);

        session.remove_node("/a").unwrap();
        assert!(!session.node_exists("/a/b/c"));
        assert!(session.node_exists("/ab"));
        assert_eq!(store.node_count(), 2);

        assert!(matches!(session.remove_node("/"), Err(Error::InvalidItemState(_))));
        assert!(matches!(session.remove_node("/a"), Err(Error::ItemNotFound(_))));
    }

    #[test]
    fn test_invalid_mutations() {
        let store = MemoryStore::new();
        let session = store.login("alice");

        assert!(matches!(
            session.add_node("/missing/child", "nt:unstructured"),
            Err(Error::ItemNotFound(_))
        ));
        assert!(matches!(
            session.add_node("relative", "nt:unstructured"),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            session.add_node("/a", "bogus:type"),
            Err(Error::Protocol(_))
        ));

        session.add_node("/a", "nt:unstructured").unwrap();
        assert!(matches!(
            session.add_node("/a", "nt:unstructured"),
            Err(Error::InvalidItemState(_))
        ));
        assert!(matches!(
            session.remove_property("/a", "nope"),
            Err(Error::ItemNotFound(_))
        ));
    }

    #[test]
    fn test_partial_batch_reports_applied_changes() {
        let store = MemoryStore::new();
        let session = store.login("alice");
        let recorder = Arc::new(Recorder::default());
        session
            .add_listener(recorder.clone(), ListenerOptions::default())
            .unwrap();

        let result = session.batch(|b| {
            b.add_node("/a", "nt:unstructured")?;
            b.add_node("/missing/b", "nt:unstructured")
        });

        assert!(result.is_err());
        let batches = recorder.batches.lock();
        assert_eq!(kinds(&batches[0]), vec![(EventType::NodeAdded, "/a")]);
    }
}
