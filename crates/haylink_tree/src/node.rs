//! Tree node capability trait.

use crate::value::{NodeValue, ValueType};
use std::sync::Arc;

/// A lifecycle callback attached to a node.
///
/// Hooks are invoked by the host from arbitrary threads and must not block.
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// Shared handle to a host tree node.
pub type NodeRef = Arc<dyn TreeNode>;

/// A host tree node with lifecycle hooks.
///
/// Nodes are owned by the host runtime. The connector mutates their children
/// and values but never their lifecycle metadata.
///
/// # Invariants
///
/// - `create_child` is get-or-create: an existing child of that name is returned
/// - At most one hook of each kind is attached; setting a hook replaces the previous one
/// - The host fires `on_subscribe` when the first observer attaches and
///   `on_unsubscribe` when the last one leaves
/// - Implementations must be `Send + Sync`; hooks may fire concurrently with mutations
pub trait TreeNode: Send + Sync {
    /// The node's (encoded) name.
    fn name(&self) -> &str;

    /// Absolute path of the node, for logging.
    fn path(&self) -> &str;

    /// Returns the named child.
    fn child(&self, name: &str) -> Option<NodeRef>;

    /// Names of all current children.
    fn child_names(&self) -> Vec<String>;

    /// Returns the named child, creating it first if needed.
    fn create_child(&self, name: &str) -> NodeRef;

    /// Removes the named child, returning it if it existed.
    fn remove_child(&self, name: &str) -> Option<NodeRef>;

    /// Current value.
    fn value(&self) -> NodeValue;

    /// Sets the current value.
    fn set_value(&self, value: NodeValue);

    /// Declared value type.
    fn value_type(&self) -> ValueType;

    /// Sets the declared value type.
    fn set_value_type(&self, value_type: ValueType);

    /// Returns true if the node is part of saved configuration.
    fn is_serializable(&self) -> bool;

    /// Marks the node as persistent or ephemeral.
    fn set_serializable(&self, serializable: bool);

    /// Sets the hook fired when an observer lists the node's children.
    fn set_on_list(&self, hook: Option<Hook>);

    /// Sets the hook fired when the first observer subscribes to the node.
    fn set_on_subscribe(&self, hook: Option<Hook>);

    /// Sets the hook fired when the last observer unsubscribes from the node.
    fn set_on_unsubscribe(&self, hook: Option<Hook>);
}
