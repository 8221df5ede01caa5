//! # haylink Tree
//!
//! The host tree as seen by the connector core.
//!
//! The core never owns tree nodes. It only creates and removes children,
//! sets values and declared types, marks nodes non-persistent, and attaches
//! lifecycle hooks. Those capabilities are captured by the [`TreeNode`] trait
//! so any host runtime can be plugged in.
//!
//! ## Contents
//!
//! - [`TreeNode`] - node-with-lifecycle-hooks capability
//! - [`NodeValue`] / [`ValueType`] - local typed values
//! - [`encode_name`] / [`decode_name`] - path-segment safe names
//! - [`MemoryNode`] - thread-safe in-memory host tree, used by tests and the CLI
//!
//! ## Example
//!
//! ```rust
//! use haylink_tree::{MemoryNode, NodeValue, TreeNode};
//!
//! let root = MemoryNode::root("server");
//! let child = root.create_child("temp");
//! child.set_value(NodeValue::Number(21.5));
//! assert_eq!(root.child_names(), vec!["temp".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod memory;
mod name;
mod node;
mod value;

pub use memory::{MemoryNode, NodeSnapshot};
pub use name::{decode_name, encode_name};
pub use node::{Hook, NodeRef, TreeNode};
pub use value::{NodeValue, ValueType};
