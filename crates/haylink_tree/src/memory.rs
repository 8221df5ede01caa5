//! In-memory host tree.

use crate::node::{Hook, NodeRef, TreeNode};
use crate::value::{NodeValue, ValueType};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A thread-safe in-memory tree node.
///
/// `MemoryNode` plays the host runtime for tests and the CLI: besides the
/// [`TreeNode`] capability it can simulate observers through [`list`],
/// [`observe`] and [`unobserve`], which fire the attached lifecycle hooks the
/// way a real host would.
///
/// Hooks always run after the node's lock is released, so a hook may freely
/// mutate the node it is attached to.
///
/// [`list`]: MemoryNode::list
/// [`observe`]: MemoryNode::observe
/// [`unobserve`]: MemoryNode::unobserve
///
/// # Example
///
/// ```rust
/// use haylink_tree::{MemoryNode, TreeNode};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let root = MemoryNode::root("server");
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&hits);
/// root.set_on_subscribe(Some(Arc::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// })));
///
/// root.observe();
/// root.observe();
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Debug)]
pub struct MemoryNode {
    name: String,
    path: String,
    state: RwLock<NodeState>,
}

#[derive(Default)]
struct NodeState {
    value: NodeValue,
    value_type: ValueType,
    serializable: bool,
    children: BTreeMap<String, Arc<MemoryNode>>,
    on_list: Option<Hook>,
    on_subscribe: Option<Hook>,
    on_unsubscribe: Option<Hook>,
    observers: usize,
}

impl std::fmt::Debug for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeState")
            .field("value", &self.value)
            .field("value_type", &self.value_type)
            .field("serializable", &self.serializable)
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .field("observers", &self.observers)
            .finish()
    }
}

impl MemoryNode {
    /// Creates a root node.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let path = format!("/{name}");
        Arc::new(Self::new(name, path))
    }

    fn new(name: String, path: String) -> Self {
        Self {
            name,
            path,
            state: RwLock::new(NodeState {
                serializable: true,
                ..NodeState::default()
            }),
        }
    }

    /// Returns the named child as a concrete node.
    pub fn node(&self, name: &str) -> Option<Arc<MemoryNode>> {
        self.state.read().children.get(name).cloned()
    }

    /// Resolves a `/`-separated path relative to this node.
    pub fn resolve(&self, relative: &str) -> Option<Arc<MemoryNode>> {
        let mut segments = relative.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut current = self.node(first)?;
        for segment in segments {
            current = current.node(segment)?;
        }
        Some(current)
    }

    /// Concrete handles to all children, in name order.
    pub fn nodes(&self) -> Vec<Arc<MemoryNode>> {
        self.state.read().children.values().cloned().collect()
    }

    /// Simulates an observer listing this node's children.
    ///
    /// Returns true if a list hook was attached.
    pub fn list(&self) -> bool {
        let hook = self.state.read().on_list.clone();
        match hook {
            Some(hook) => {
                hook();
                true
            }
            None => false,
        }
    }

    /// Simulates an observer subscribing to this node.
    ///
    /// The subscribe hook fires only for the first observer.
    pub fn observe(&self) {
        let hook = {
            let mut state = self.state.write();
            state.observers += 1;
            if state.observers == 1 {
                state.on_subscribe.clone()
            } else {
                None
            }
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Simulates an observer leaving this node.
    ///
    /// The unsubscribe hook fires only when the last observer leaves.
    pub fn unobserve(&self) {
        let hook = {
            let mut state = self.state.write();
            if state.observers == 0 {
                return;
            }
            state.observers -= 1;
            if state.observers == 0 {
                state.on_unsubscribe.clone()
            } else {
                None
            }
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Number of current observers.
    pub fn observers(&self) -> usize {
        self.state.read().observers
    }

    /// Returns true if a list hook is attached.
    pub fn has_list_hook(&self) -> bool {
        self.state.read().on_list.is_some()
    }

    /// Returns true if subscribe and unsubscribe hooks are attached.
    pub fn has_subscription_hooks(&self) -> bool {
        let state = self.state.read();
        state.on_subscribe.is_some() && state.on_unsubscribe.is_some()
    }

    /// Captures the subtree rooted at this node.
    pub fn snapshot(&self) -> NodeSnapshot {
        let state = self.state.read();
        NodeSnapshot {
            name: self.name.clone(),
            value: if state.value.is_null() {
                None
            } else {
                Some(state.value.clone())
            },
            children: state.children.values().map(|c| c.snapshot()).collect(),
        }
    }
}

impl TreeNode for MemoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn child(&self, name: &str) -> Option<NodeRef> {
        self.node(name).map(|c| c as NodeRef)
    }

    fn child_names(&self) -> Vec<String> {
        self.state.read().children.keys().cloned().collect()
    }

    fn create_child(&self, name: &str) -> NodeRef {
        let mut state = self.state.write();
        let child: Arc<MemoryNode> = state
            .children
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryNode::new(
                    name.to_string(),
                    format!("{}/{}", self.path, name),
                ))
            })
            .clone();
        child as NodeRef
    }

    fn remove_child(&self, name: &str) -> Option<NodeRef> {
        self.state
            .write()
            .children
            .remove(name)
            .map(|c| c as NodeRef)
    }

    fn value(&self) -> NodeValue {
        self.state.read().value.clone()
    }

    fn set_value(&self, value: NodeValue) {
        self.state.write().value = value;
    }

    fn value_type(&self) -> ValueType {
        self.state.read().value_type
    }

    fn set_value_type(&self, value_type: ValueType) {
        self.state.write().value_type = value_type;
    }

    fn is_serializable(&self) -> bool {
        self.state.read().serializable
    }

    fn set_serializable(&self, serializable: bool) {
        self.state.write().serializable = serializable;
    }

    fn set_on_list(&self, hook: Option<Hook>) {
        self.state.write().on_list = hook;
    }

    fn set_on_subscribe(&self, hook: Option<Hook>) {
        self.state.write().on_subscribe = hook;
    }

    fn set_on_unsubscribe(&self, hook: Option<Hook>) {
        self.state.write().on_unsubscribe = hook;
    }
}

/// A serializable copy of a subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    /// Node name.
    pub name: String,
    /// Node value, if not null.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<NodeValue>,
    /// Children in name order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}
