//! Item identifiers.
//!
//! A node is identified either by its path, or by the unique id of a
//! referenceable node plus an optional path relative to it. Reference-based
//! ids survive moves; path-based ids do not. Properties are identified by
//! their parent node id and their name.

use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;
use crate::name::Name;
use crate::path::Path;

/// Identifier of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct NodeId {
    unique_id: Option<String>,
    path: Option<Path>,
}

impl NodeId {
    /// The unique id of the referenceable node this id is anchored at.
    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    /// The path: absolute for path-based ids, relative to the unique id otherwise.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    /// Whether this id is anchored at a stable reference.
    pub fn is_reference_based(&self) -> bool {
        self.unique_id.is_some()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.unique_id, &self.path) {
            (Some(id), Some(path)) => write!(f, "[{}]{}", id, path),
            (Some(id), None) => write!(f, "[{}]", id),
            (None, Some(path)) => write!(f, "{}", path),
            (None, None) => write!(f, "<invalid>"),
        }
    }
}

/// Identifier of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct PropertyId {
    parent: NodeId,
    name: Name,
}

impl PropertyId {
    /// Id of the node owning the property.
    pub fn parent(&self) -> &NodeId {
        &self.parent
    }

    /// Property name.
    pub fn name(&self) -> &Name {
        &self.name
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent, self.name)
    }
}

/// Identifier of any item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum ItemId {
    /// A node.
    Node(NodeId),
    /// A property.
    Property(PropertyId),
}

impl ItemId {
    /// Whether this identifies a node.
    pub fn denotes_node(&self) -> bool {
        matches!(self, ItemId::Node(_))
    }

    /// The node id, if this identifies a node.
    pub fn as_node(&self) -> Option<&NodeId> {
        match self {
            ItemId::Node(id) => Some(id),
            ItemId::Property(_) => None,
        }
    }

    /// The property id, if this identifies a property.
    pub fn as_property(&self) -> Option<&PropertyId> {
        match self {
            ItemId::Node(_) => None,
            ItemId::Property(id) => Some(id),
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Node(id) => id.fmt(f),
            ItemId::Property(id) => id.fmt(f),
        }
    }
}

impl From<NodeId> for ItemId {
    fn from(id: NodeId) -> Self {
        ItemId::Node(id)
    }
}

impl From<PropertyId> for ItemId {
    fn from(id: PropertyId) -> Self {
        ItemId::Property(id)
    }
}

/// Builds item identifiers.
pub trait IdFactory: Send + Sync {
    /// Build a node id from a unique id, a path, or both.
    ///
    /// With a unique id the path is interpreted relative to the referenced
    /// node; without one it must be absolute.
    fn create_node_id(&self, unique_id: Option<&str>, path: Option<&Path>) -> Result<NodeId, Error>;

    /// Build a property id from its parent node id and name.
    fn create_property_id(&self, parent: &NodeId, name: &Name) -> Result<PropertyId, Error>;
}

/// The plain identifier factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIdFactory;

impl IdFactory for DefaultIdFactory {
    fn create_node_id(&self, unique_id: Option<&str>, path: Option<&Path>) -> Result<NodeId, Error> {
        match (unique_id, path) {
            (None, None) => Err(Error::InvalidId(
                "a node id needs a unique id or a path".to_string(),
            )),
            (Some(""), _) => Err(Error::InvalidId("empty unique id".to_string())),
            (unique_id, path) => Ok(NodeId {
                unique_id: unique_id.map(str::to_string),
                path: path.cloned(),
            }),
        }
    }

    fn create_property_id(&self, parent: &NodeId, name: &Name) -> Result<PropertyId, Error> {
        Ok(PropertyId {
            parent: parent.clone(),
            name: name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::NamespaceRegistry;

    #[test]
    fn test_path_based_node_id() {
        let path = Path::parse("/a/b", &NamespaceRegistry::new()).unwrap();
        let id = DefaultIdFactory.create_node_id(None, Some(&path)).unwrap();

        assert!(!id.is_reference_based());
        assert_eq!(id.path(), Some(&path));
        assert_eq!(id.to_string(), "/a/b");
    }

    #[test]
    fn test_reference_based_node_id() {
        let id = DefaultIdFactory.create_node_id(Some("1234"), None).unwrap();

        assert!(id.is_reference_based());
        assert_eq!(id.unique_id(), Some("1234"));
        assert!(id.path().is_none());
        assert_eq!(id.to_string(), "[1234]");
    }

    #[test]
    fn test_node_id_requires_parts() {
        assert!(DefaultIdFactory.create_node_id(None, None).is_err());
        assert!(DefaultIdFactory.create_node_id(Some(""), None).is_err());
    }

    #[test]
    fn test_property_id() {
        let parent = DefaultIdFactory.create_node_id(Some("1234"), None).unwrap();
        let id = DefaultIdFactory
            .create_property_id(&parent, &Name::new("", "title"))
            .unwrap();
        let item: ItemId = id.clone().into();

        assert_eq!(id.parent(), &parent);
        assert!(!item.denotes_node());
        assert_eq!(item.as_property(), Some(&id));
        assert_eq!(item.to_string(), "[1234]/title");
    }
}
