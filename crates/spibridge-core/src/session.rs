//! Live content access needed while translating notifications.

use spibridge_proto::NamespaceResolver;

use crate::error::Error;

/// Result of asking a node for its stable reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StableReference {
    /// The node is referenceable and carries this unique id.
    Referenced(String),
    /// The node cannot be referenced; callers fall back to its path.
    Unsupported,
}

/// Read access to the live content of a repository session.
pub trait ContentSession: Send + Sync {
    /// Handle to a live node.
    type Node;

    /// Resolver for the prefixes used in paths and type names.
    fn namespace_resolver(&self) -> &dyn NamespaceResolver;

    /// The parent node of the item at `path`.
    ///
    /// Fails with [`Error::ItemNotFound`] when the item itself no longer
    /// exists.
    fn parent_node(&self, path: &str) -> Result<Self::Node, Error>;

    /// Prefixed name of the node's primary type.
    fn primary_type_name(&self, node: &Self::Node) -> Result<String, Error>;

    /// Prefixed names of the node's mixin types, in assignment order.
    fn mixin_type_names(&self, node: &Self::Node) -> Result<Vec<String>, Error>;

    /// The node's stable reference, if it has one.
    fn stable_reference(&self, node: &Self::Node) -> Result<StableReference, Error>;
}
